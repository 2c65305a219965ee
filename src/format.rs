//! Trained-network file format.
//!
//! All fields are little-endian `u32` or IEEE-754 `f32`; every offset is a
//! byte offset from the start of the file.
//!
//! ```text
//! 0    FileHeader     magic, cost tag, layer count N,
//!                     layers offset, weights offset, biases offset   (24 B)
//! 24   layers         N x u32 widths
//!      weights        (N-1) x MatrixEntry {rows, cols, data offset}  (12 B each)
//!                     then each matrix's column-major payload
//!      biases         (N-1) x VectorEntry {dim, data offset}         (8 B each)
//!                     then each vector's payload
//! ```
//!
//! Loading validates the whole file before touching the arena, then copies
//! the image into one arena block and points every parameter handle into it.

use std::fs;
use std::path::Path;

use log::info;

use crate::arena::{Arena, WORD_BYTES};
use crate::cost::CostFunction;
use crate::network::Network;
use crate::tensor::{Matrix, Tensor, Vector};
use crate::{Error, Result};

pub const MAGIC: u32 = 1337;
pub const HEADER_BYTES: usize = 24;
pub const MATRIX_ENTRY_BYTES: usize = 12;
pub const VECTOR_ENTRY_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub cost: u32,
    pub layer_count: u32,
    pub layers_offset: u32,
    pub weights_offset: u32,
    pub biases_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixEntry {
    pub rows: u32,
    pub cols: u32,
    pub data_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorEntry {
    pub dim: u32,
    pub data_offset: u32,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidFormat(msg.into())
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| invalid(format!("{what} {value} does not fit in u32")))
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_f32s(buf: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// Size in bytes of `network` once serialized.
pub fn encoded_len(network: &Network) -> usize {
    let n = network.layer_count();
    let params = network.parameter_count();
    HEADER_BYTES
        + n * WORD_BYTES
        + (n - 1) * (MATRIX_ENTRY_BYTES + VECTOR_ENTRY_BYTES)
        + params * WORD_BYTES
}

/// Serialize `network` into the file layout.
pub fn save_network(arena: &Arena, network: &Network) -> Result<Vec<u8>> {
    let n = network.layer_count();
    let total = encoded_len(network);
    to_u32(total, "file size")?;

    let layers_offset = HEADER_BYTES;
    let weights_offset = layers_offset + n * WORD_BYTES;
    let weight_data_start = weights_offset + (n - 1) * MATRIX_ENTRY_BYTES;
    let weight_bytes = (1..n).map(|l| network.weight(l).len()).sum::<usize>() * WORD_BYTES;
    let biases_offset = weight_data_start + weight_bytes;
    let bias_data_start = biases_offset + (n - 1) * VECTOR_ENTRY_BYTES;

    let header = FileHeader {
        magic: MAGIC,
        cost: network.cost().tag(),
        layer_count: n as u32,
        layers_offset: layers_offset as u32,
        weights_offset: weights_offset as u32,
        biases_offset: biases_offset as u32,
    };

    let mut buf = Vec::with_capacity(total);
    for word in [
        header.magic,
        header.cost,
        header.layer_count,
        header.layers_offset,
        header.weights_offset,
        header.biases_offset,
    ] {
        put_u32(&mut buf, word);
    }
    for &width in network.layers() {
        put_u32(&mut buf, width as u32);
    }

    let mut data_offset = weight_data_start;
    for l in 1..n {
        let w = network.weight(l);
        put_u32(&mut buf, w.rows() as u32);
        put_u32(&mut buf, w.cols() as u32);
        put_u32(&mut buf, data_offset as u32);
        data_offset += w.len() * WORD_BYTES;
    }
    for l in 1..n {
        put_f32s(&mut buf, arena.values(network.weight(l)));
    }

    let mut data_offset = bias_data_start;
    for l in 1..n {
        let b = network.bias(l);
        put_u32(&mut buf, b.dim() as u32);
        put_u32(&mut buf, data_offset as u32);
        data_offset += b.dim() * WORD_BYTES;
    }
    for l in 1..n {
        put_f32s(&mut buf, arena.values(network.bias(l)));
    }

    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl Reader<'_> {
    fn u32_at(&self, offset: usize) -> Result<u32> {
        let word = offset
            .checked_add(WORD_BYTES)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or_else(|| {
                invalid(format!(
                    "read at byte {offset} past end of {}-byte file",
                    self.bytes.len()
                ))
            })?;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }

    /// Check that `count` records of `record` bytes fit at `offset`.
    fn region(&self, offset: u32, count: usize, record: usize, what: &str) -> Result<usize> {
        let offset = offset as usize;
        if !offset.is_multiple_of(WORD_BYTES) {
            return Err(invalid(format!("{what} offset {offset} is not 4-byte aligned")));
        }
        let end = count
            .checked_mul(record)
            .and_then(|len| len.checked_add(offset))
            .ok_or_else(|| invalid(format!("{what} size overflows")))?;
        if end > self.bytes.len() {
            return Err(invalid(format!(
                "{what} at {offset}..{end} runs past end of {}-byte file",
                self.bytes.len()
            )));
        }
        Ok(offset)
    }
}

/// Header, widths and entries of a file that passed validation.
#[derive(Debug)]
struct Parsed {
    cost: CostFunction,
    weights: Vec<MatrixEntry>,
    biases: Vec<VectorEntry>,
}

fn parse(bytes: &[u8]) -> Result<Parsed> {
    if bytes.len() < HEADER_BYTES {
        return Err(invalid(format!("file of {} bytes is shorter than the header", bytes.len())));
    }
    if !bytes.len().is_multiple_of(WORD_BYTES) {
        return Err(invalid(format!("file size {} is not a whole number of words", bytes.len())));
    }
    let r = Reader { bytes };

    let header = FileHeader {
        magic: r.u32_at(0)?,
        cost: r.u32_at(4)?,
        layer_count: r.u32_at(8)?,
        layers_offset: r.u32_at(12)?,
        weights_offset: r.u32_at(16)?,
        biases_offset: r.u32_at(20)?,
    };
    if header.magic != MAGIC {
        return Err(invalid(format!("bad magic {}, expected {MAGIC}", header.magic)));
    }
    let cost = CostFunction::from_tag(header.cost)?;
    let n = header.layer_count as usize;
    if n < 2 {
        return Err(invalid(format!("layer count {n} is below 2")));
    }

    let layers_at = r.region(header.layers_offset, n, WORD_BYTES, "layers")?;
    let mut layers = Vec::with_capacity(n);
    for i in 0..n {
        let width = r.u32_at(layers_at + i * WORD_BYTES)?;
        if width == 0 {
            return Err(invalid(format!("layer {i} has width 0")));
        }
        layers.push(width);
    }

    let weights_at = r.region(header.weights_offset, n - 1, MATRIX_ENTRY_BYTES, "weight entries")?;
    let mut weights = Vec::with_capacity(n - 1);
    for l in 1..n {
        let at = weights_at + (l - 1) * MATRIX_ENTRY_BYTES;
        let entry = MatrixEntry {
            rows: r.u32_at(at)?,
            cols: r.u32_at(at + 4)?,
            data_offset: r.u32_at(at + 8)?,
        };
        if entry.rows != layers[l] || entry.cols != layers[l - 1] {
            return Err(invalid(format!(
                "weight[{l}] is {}x{}, expected {}x{}",
                entry.rows,
                entry.cols,
                layers[l],
                layers[l - 1]
            )));
        }
        let len = (entry.rows as usize)
            .checked_mul(entry.cols as usize)
            .ok_or_else(|| invalid(format!("weight[{l}] size overflows")))?;
        r.region(entry.data_offset, len, WORD_BYTES, &format!("weight[{l}] data"))?;
        weights.push(entry);
    }

    let biases_at = r.region(header.biases_offset, n - 1, VECTOR_ENTRY_BYTES, "bias entries")?;
    let mut biases = Vec::with_capacity(n - 1);
    for l in 1..n {
        let at = biases_at + (l - 1) * VECTOR_ENTRY_BYTES;
        let entry = VectorEntry {
            dim: r.u32_at(at)?,
            data_offset: r.u32_at(at + 4)?,
        };
        if entry.dim != layers[l] {
            return Err(invalid(format!(
                "bias[{l}] has dim {}, expected {}",
                entry.dim, layers[l]
            )));
        }
        r.region(entry.data_offset, entry.dim as usize, WORD_BYTES, &format!("bias[{l}] data"))?;
        biases.push(entry);
    }

    Ok(Parsed {
        cost,
        weights,
        biases,
    })
}

/// Decode a network and place its parameters in `arena`.
///
/// Nothing is allocated unless the whole file validates.
pub fn load_network(arena: &mut Arena, bytes: &[u8]) -> Result<Network> {
    let parsed = parse(bytes)?;
    arena.check_fits(bytes.len())?;

    let image = Vector::raw(arena, bytes.len() / WORD_BYTES);
    for (word, chunk) in arena.values_mut(image).iter_mut().zip(bytes.chunks_exact(WORD_BYTES)) {
        *word = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let block = image.data();

    let weights = parsed
        .weights
        .iter()
        .map(|e| {
            let (rows, cols) = (e.rows as usize, e.cols as usize);
            let data = block.slice(e.data_offset as usize / WORD_BYTES, rows * cols);
            Matrix::from_array(data, rows, cols)
        })
        .collect();
    let biases = parsed
        .biases
        .iter()
        .map(|e| Vector::from_array(block.slice(e.data_offset as usize / WORD_BYTES, e.dim as usize)))
        .collect();

    Network::from_parts(parsed.cost, weights, biases)
}

pub fn save_network_file(path: &Path, arena: &Arena, network: &Network) -> Result<()> {
    let bytes = save_network(arena, network)?;
    fs::write(path, &bytes).map_err(|err| Error::Io(format!("{}: {err}", path.display())))?;
    info!("saved network {:?} to {} ({} bytes)", network.layers(), path.display(), bytes.len());
    Ok(())
}

pub fn load_network_file(arena: &mut Arena, path: &Path) -> Result<Network> {
    let bytes = fs::read(path).map_err(|err| Error::Io(format!("{}: {err}", path.display())))?;
    let network = load_network(arena, &bytes)?;
    info!("loaded network {:?} from {}", network.layers(), path.display());
    Ok(network)
}
