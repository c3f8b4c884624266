use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::{array, Array1};
use ndarray_panoc::{NoConstraints, PanocParams, PanocSolver, PgaParams, PgaSolver, Problem};
use std::hint::black_box;

fn rosenbrock<'a>() -> Problem<'a, NoConstraints, NoConstraints> {
    Problem::unconstrained(
        2,
        NoConstraints,
        |x| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2),
        |x, mut g| {
            g[0] = -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]);
            g[1] = 200.0 * (x[1] - x[0] * x[0]);
        },
    )
}

fn convex_qp<'a>() -> Problem<'a, NoConstraints, NoConstraints> {
    Problem::unconstrained(
        2,
        NoConstraints,
        |x| 0.5 * (4.0 * x[0] * x[0] + 2.0 * x[0] * x[1] + 3.0 * x[1] * x[1]) + x[0] + x[1],
        |x, mut g| {
            g[0] = 4.0 * x[0] + x[1] + 1.0;
            g[1] = x[0] + 3.0 * x[1] + 1.0;
        },
    )
}

fn bench_panoc_rosenbrock(c: &mut Criterion) {
    let problem = rosenbrock();
    let mut solver = PanocSolver::new(PanocParams { max_iter: 1000, ..PanocParams::default() });
    c.bench_function("panoc_rosenbrock", |b| {
        b.iter(|| {
            let mut x = array![-1.2, 1.0];
            let mut y = Array1::zeros(0);
            let mut err_z = Array1::zeros(0);
            let stats = solver
                .solve(
                    black_box(&problem),
                    Array1::zeros(0).view(),
                    1e-8,
                    false,
                    &mut x,
                    &mut y,
                    &mut err_z,
                )
                .expect("preconditions hold");
            black_box((x, stats))
        })
    });
}

fn bench_pga_qp(c: &mut Criterion) {
    let problem = convex_qp();
    let mut solver = PgaSolver::new(PgaParams { max_iter: 500, ..PgaParams::default() });
    c.bench_function("pga_convex_qp", |b| {
        b.iter(|| {
            let mut x = array![5.0, -5.0];
            let mut y = Array1::zeros(0);
            let mut err_z = Array1::zeros(0);
            let stats = solver
                .solve(
                    black_box(&problem),
                    Array1::zeros(0).view(),
                    1e-9,
                    false,
                    &mut x,
                    &mut y,
                    &mut err_z,
                )
                .expect("preconditions hold");
            black_box((x, stats))
        })
    });
}

criterion_group!(benches, bench_panoc_rosenbrock, bench_pga_qp);
criterion_main!(benches);
