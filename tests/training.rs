use std::fs;
use std::path::{Path, PathBuf};

use arena_mlp::train::{self, FitConfig};
use arena_mlp::{Arena, CostFunction, Lfsr113, Network, format, mnist};

const SIDE: u32 = 4;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("arena-mlp-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

// Digit `k` lights pixel `k` fully and its neighbour dimly.
fn write_idx_pair(dir: &Path, images: &str, labels: &str, count: usize) {
    let mut image_bytes = Vec::new();
    for word in [mnist::IMAGES_MAGIC, count as u32, SIDE, SIDE] {
        image_bytes.extend_from_slice(&word.to_be_bytes());
    }
    let mut label_bytes = Vec::new();
    for word in [mnist::LABELS_MAGIC, count as u32] {
        label_bytes.extend_from_slice(&word.to_be_bytes());
    }

    for i in 0..count {
        let digit = i % mnist::CLASSES;
        let mut pixels = [0_u8; (SIDE * SIDE) as usize];
        pixels[digit] = 255;
        pixels[digit + 1] = (i % 3) as u8 * 40;
        image_bytes.extend_from_slice(&pixels);
        label_bytes.push(digit as u8);
    }

    fs::write(dir.join(images), image_bytes).unwrap();
    fs::write(dir.join(labels), label_bytes).unwrap();
}

#[test]
fn trains_on_idx_files_and_survives_a_save_load_cycle() {
    let dir = scratch_dir("training");
    write_idx_pair(&dir, mnist::TRAIN_IMAGES, mnist::TRAIN_LABELS, 120);
    write_idx_pair(&dir, mnist::TEST_IMAGES, mnist::TEST_LABELS, 30);

    let (train_file, test) = mnist::load_standard(&dir).unwrap();
    assert_eq!(train_file.input_dim(), 16);
    assert_eq!(test.len(), 30);
    let (train_set, held_out) = train_file.split_at(100);
    assert_eq!((train_set.len(), held_out.len()), (100, 20));

    let mut arena = Arena::with_megabytes(4);
    let mut rng = Lfsr113::new(2024);
    let network = Network::new(
        &mut arena,
        &mut rng,
        &[train_set.input_dim(), 20, mnist::CLASSES],
        CostFunction::CrossEntropy,
    )
    .unwrap();

    let config = FitConfig {
        epochs: 40,
        batch_size: 10,
        learning_rate: 3.0,
        regularization: 0.0,
    };
    let report = train::fit(&mut arena, &mut rng, &network, &train_set, &test, config).unwrap();
    assert_eq!(report.epochs.len(), 40);
    assert!(
        report.final_success_rate() >= 0.9,
        "success rate stayed at {}",
        report.final_success_rate()
    );

    let path = dir.join("trained.nn");
    format::save_network_file(&path, &arena, &network).unwrap();
    let reloaded = format::load_network_file(&mut arena, &path).unwrap();
    assert_eq!(reloaded.layers(), network.layers());
    assert_eq!(reloaded.cost(), CostFunction::CrossEntropy);

    let original_rate = train::evaluate(&mut arena, &mut rng, &network, &test).unwrap();
    let reloaded_rate = train::evaluate(&mut arena, &mut rng, &reloaded, &test).unwrap();
    assert_eq!(original_rate, reloaded_rate);
    arena.check_empty();

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_data_files_are_io_errors() {
    let dir = scratch_dir("missing");
    let err = mnist::load_standard(&dir).unwrap_err();
    assert!(matches!(err, arena_mlp::Error::Io(_)), "{err}");
    fs::remove_dir_all(&dir).unwrap();
}
