use cellcache_storage::prelude::*;
use utilities::loaders::CheckerboardLoader;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn cell_view_point_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_view_point_reads");
    for size in DATASET_SIZES.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || set_up_memory_array(size),
                |array| {
                    let view = array.view();
                    for p in view.extent().iter_points() {
                        black_box(view.get(p).unwrap());
                    }
                },
            );
        });
    }
    group.finish();
}

fn cell_view_read_extent(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_view_read_extent");
    for size in DATASET_SIZES.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || set_up_memory_array(size),
                |array| {
                    let view = array.view();
                    black_box(view.read_extent(&view.extent()).unwrap());
                },
            );
        });
    }
    group.finish();
}

fn cell_view_write_back_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_view_write_back_churn");
    for size in DATASET_SIZES.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let options = CellCacheOptions::default()
                        .cell_size(CELL_EDGE)
                        .max_cache_size(4)
                        .temp_dir_prefix("cellcache-bench");
                    CachedCellArray::create(
                        PointN([size; 3]),
                        CheckerboardLoader::new(grid_for(size)),
                        &options,
                    )
                    .unwrap()
                },
                |array| {
                    let view = array.view();
                    view.fill_extent(&view.extent(), 7).unwrap();
                    black_box(view.read_extent(&view.extent()).unwrap());
                },
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    cell_view_point_reads,
    cell_view_read_extent,
    cell_view_write_back_churn
);
criterion_main!(benches);

const DATASET_SIZES: [i64; 3] = [16, 32, 64];
const CELL_EDGE: i64 = 16;

fn grid_for(size: i64) -> CellGrid3 {
    CellGrid::new(PointN([size; 3]), PointN([CELL_EDGE; 3])).unwrap()
}

fn set_up_memory_array(size: i64) -> CachedCellArray<u16, 3> {
    let options = CellCacheOptions::default()
        .cell_size(CELL_EDGE)
        .cache(CacheCapacity::Unbounded);

    CachedCellArray::read_only(
        PointN([size; 3]),
        CheckerboardLoader::new(grid_for(size)),
        &options,
    )
    .unwrap()
}
