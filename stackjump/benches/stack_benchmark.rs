use std::ffi::c_void;
use std::ptr;

use criterion::{criterion_group, criterion_main, Criterion};

use stackjump::Context;

struct Pair {
    origin: *mut Context,
    coroutine: *mut Context,
}

fn bounce(data: *mut c_void) -> ! {
    let pair = data as *mut Pair;
    loop {
        unsafe { Context::switch((*pair).coroutine, (*pair).origin) };
    }
}

fn stackjump(c: &mut Criterion) {
    // Tests both allocation and drop.
    c.bench_function("create 1 MB context", |b| {
        b.iter(|| Context::new(16 * 1024, 1024 * 1024, bounce, ptr::null_mut()))
    });

    #[cfg(target_family = "unix")]
    c.bench_function("allocate 8 MB guarded stack", |b| {
        b.iter(|| stackjump::stack::GuardedStack::new(0, 8 * 1024 * 1024))
    });

    c.bench_function("switch between stacks", |b| {
        let pair = Box::into_raw(Box::new(Pair {
            origin: ptr::null_mut(),
            coroutine: ptr::null_mut(),
        }));
        unsafe {
            (*pair).origin = Box::into_raw(Context::origin(ptr::null_mut()).unwrap());
            (*pair).coroutine = Box::into_raw(
                Context::new(16 * 1024, 1024 * 1024, bounce, pair as *mut c_void).unwrap(),
            );
        }

        b.iter(|| unsafe { Context::switch((*pair).origin, (*pair).coroutine) });

        unsafe {
            drop(Box::from_raw((*pair).coroutine));
            drop(Box::from_raw((*pair).origin));
            drop(Box::from_raw(pair));
        }
    });
}

criterion_group!(benches, stackjump);
criterion_main!(benches);
