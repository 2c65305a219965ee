//! MNIST IDX loader.
//!
//! Images come from an IDX3 file (`magic 2051, count, rows, cols`, then one
//! `u8` per pixel) and labels from an IDX1 file (`magic 2049, count`, then one
//! `u8` per label). Header words are big-endian. Pixels are scaled to
//! `[0, 1]` and labels become one-hot targets over [`CLASSES`] outputs.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::{Dataset, Error, Result};

pub const IMAGES_MAGIC: u32 = 2051;
pub const LABELS_MAGIC: u32 = 2049;

/// Number of digit classes.
pub const CLASSES: usize = 10;

pub const TRAIN_IMAGES: &str = "train-images.idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels.idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images.idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels.idx1-ubyte";

fn read_u32_be(reader: &mut impl Read, what: &str) -> Result<u32> {
    let mut bytes = [0_u8; 4];
    reader
        .read_exact(&mut bytes)
        .map_err(|err| Error::InvalidFormat(format!("truncated {what}: {err}")))?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_payload(reader: &mut impl Read, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut bytes = vec![0_u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|err| Error::InvalidFormat(format!("{what} shorter than {len} bytes: {err}")))?;
    Ok(bytes)
}

fn expect_magic(found: u32, expected: u32, what: &str) -> Result<()> {
    if found != expected {
        return Err(Error::InvalidFormat(format!(
            "{what} magic is {found}, expected {expected}"
        )));
    }
    Ok(())
}

/// Decode an image/label pair into a dataset.
pub fn read_dataset(mut images: impl Read, mut labels: impl Read) -> Result<Dataset> {
    expect_magic(read_u32_be(&mut images, "image header")?, IMAGES_MAGIC, "image file")?;
    let count = read_u32_be(&mut images, "image header")? as usize;
    let rows = read_u32_be(&mut images, "image header")? as usize;
    let cols = read_u32_be(&mut images, "image header")? as usize;

    expect_magic(read_u32_be(&mut labels, "label header")?, LABELS_MAGIC, "label file")?;
    let label_count = read_u32_be(&mut labels, "label header")? as usize;
    if label_count != count {
        return Err(Error::InvalidFormat(format!(
            "{count} images but {label_count} labels"
        )));
    }

    let pixels_per_image = rows * cols;
    if pixels_per_image == 0 {
        return Err(Error::InvalidFormat(format!("empty image size {rows}x{cols}")));
    }
    let pixel_bytes = count
        .checked_mul(pixels_per_image)
        .ok_or_else(|| Error::InvalidFormat("image payload size overflows".to_owned()))?;

    let pixels = read_payload(&mut images, pixel_bytes, "image data")?;
    let label_bytes = read_payload(&mut labels, count, "label data")?;

    let inputs: Vec<f32> = pixels.iter().map(|&p| f32::from(p) / 255.0).collect();
    let mut targets = vec![0.0_f32; count * CLASSES];
    for (i, &label) in label_bytes.iter().enumerate() {
        let label = label as usize;
        if label >= CLASSES {
            return Err(Error::InvalidFormat(format!(
                "label {i} is {label}, expected < {CLASSES}"
            )));
        }
        targets[i * CLASSES + label] = 1.0;
    }

    Dataset::from_flat(inputs, targets, pixels_per_image, CLASSES)
}

/// Load `images` and `labels` from disk.
pub fn load_dataset(images: &Path, labels: &Path) -> Result<Dataset> {
    let open = |path: &Path| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|err| Error::Io(format!("{}: {err}", path.display())))
    };
    read_dataset(open(images)?, open(labels)?)
}

/// Load the standard training and test files from `dir`.
pub fn load_standard(dir: &Path) -> Result<(Dataset, Dataset)> {
    let train = load_dataset(&dir.join(TRAIN_IMAGES), &dir.join(TRAIN_LABELS))?;
    let test = load_dataset(&dir.join(TEST_IMAGES), &dir.join(TEST_LABELS))?;
    Ok((train, test))
}
