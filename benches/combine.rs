//! Criterion benchmarks for the label-combination transform.
//!
//! Run with: cargo bench --bench combine
//!
//! Tracks the cost of the per-voxel remap over realistic parcellation sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dsegroi::nifti::NiftiImage;
use dsegroi::{combine_dseg_labels, CombineOptions, GroupSpec};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

/// A synthetic parcellation with labels cycling over 0..100.
fn label_volume(shape: &[usize]) -> NiftiImage {
    let numel: usize = shape.iter().product();
    let values: Vec<i32> = (0..numel).map(|i| (i % 100) as i32).collect();
    let array = ArrayD::from_shape_vec(IxDyn(shape).f(), values).unwrap();
    let affine = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    NiftiImage::from_array(array, affine)
}

/// Ten ROIs of five consecutive labels each.
fn ten_rois() -> GroupSpec {
    GroupSpec::Groups(
        (0..10)
            .map(|g| (0..5).map(|i| g * 5 + i + 1).collect())
            .collect(),
    )
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine");
    let groups = ten_rois();

    for &shape in &[[64, 64, 64], [128, 128, 96], [197, 233, 189]] {
        let img = label_volume(&shape);
        let voxels: usize = shape.iter().product();
        let label = format!("{}x{}x{}", shape[0], shape[1], shape[2]);

        group.throughput(Throughput::Elements(voxels as u64));
        group.bench_with_input(BenchmarkId::from_parameter(&label), &img, |b, img| {
            b.iter(|| {
                let combined = combine_dseg_labels(
                    black_box(img.clone()),
                    &groups,
                    &CombineOptions::new(),
                )
                .unwrap();
                black_box(combined)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_combine);
criterion_main!(benches);
