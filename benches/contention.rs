use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use shmbank::{Account, Shm};

fn bench(c: &mut Criterion) {
    let n = 1000;
    let name = format!("/shmbank-bench-{}", std::process::id());
    let mut shm = Shm::new(&name, size_of::<Account>()).unwrap();
    Account::init_in(&mut shm, 0).unwrap();
    let account = Account::attach(&shm).unwrap();

    let mut group = c.benchmark_group("transaction_throughput");
    group.throughput(Throughput::Elements(n));
    group.bench_function("deposit_withdraw", |b| {
        b.iter(|| {
            for _ in 0..n {
                account.transact(1).unwrap();
                account.transact(-1).unwrap();
            }
        })
    });
}

criterion_group!(benches, bench);
criterion_main!(benches);
