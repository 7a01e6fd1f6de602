//! Multi-threaded use of a shared host and its modules

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use modhost::testing::FakeRuntime;
use modhost::{ErrorKind, Host, SignatureTag, ValueType};

extern "C" fn add(a: i32, b: i32) -> i32 {
    a + b
}

type BinaryFn = extern "C" fn(i32, i32) -> i32;

fn binary_i32() -> SignatureTag {
    SignatureTag::new(vec![ValueType::I32, ValueType::I32], ValueType::I32)
}

fn setup() -> (Arc<FakeRuntime>, Host) {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.register_function("Demo.Calculator", "Add", add as BinaryFn as usize);
    let host = Host::builder(Arc::clone(&runtime))
        .auto_initialize(true)
        .build()
        .unwrap();
    (runtime, host)
}

#[test]
fn test_concurrent_first_resolution_calls_native_once() {
    let (runtime, host) = setup();
    runtime.delay_resolution(Duration::from_millis(50));
    let module = host.load("Calculator.dll").unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let module = module.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                module
                    .resolve("Demo.Calculator", "Add", binary_i32())
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(runtime.calls().get_function_pointer, 1);
    assert!(results.iter().all(|r| r.same_entry(&results[0])));
    assert_eq!(module.cached_len(), 1);
}

#[test]
fn test_concurrent_loads_get_distinct_modules() {
    let (runtime, host) = setup();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let host = host.clone();
            thread::spawn(move || host.load(&format!("Module{}.dll", i)).unwrap())
        })
        .collect();
    let modules: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut raw: Vec<_> = modules.iter().map(|m| m.handle()).collect();
    raw.sort();
    raw.dedup();
    assert_eq!(raw.len(), 16);
    assert_eq!(host.module_count(), 16);
    assert_eq!(runtime.calls().load, 16);
}

#[test]
fn test_concurrent_module_and_host_dispose() {
    let (runtime, host) = setup();
    let modules: Vec<_> = (0..8)
        .map(|i| host.load(&format!("Module{}.dll", i)).unwrap())
        .collect();

    let barrier = Arc::new(Barrier::new(modules.len() + 1));
    let mut handles: Vec<_> = modules
        .iter()
        .cloned()
        .map(|module| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                module.dispose()
            })
        })
        .collect();
    handles.push({
        let host = host.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            host.dispose()
        })
    });

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    // Every module is unloaded exactly once, by itself or by the cascade
    assert_eq!(runtime.calls().unload, modules.len());
    assert_eq!(runtime.calls().destroy, 1);
    assert!(modules.iter().all(|m| m.is_disposed()));
}

#[test]
fn test_resolve_racing_host_dispose() {
    let (runtime, host) = setup();
    runtime.delay_resolution(Duration::from_millis(20));
    let module = host.load("Calculator.dll").unwrap();

    let resolver = {
        let module = module.clone();
        thread::spawn(move || module.resolve("Demo.Calculator", "Add", binary_i32()))
    };
    thread::sleep(Duration::from_millis(5));
    host.dispose().unwrap();

    // Either the resolve finished first and the cascade cleared it, or it
    // observed the disposal
    if let Err(err) = resolver.join().unwrap() {
        assert_eq!(err.kind(), ErrorKind::UseAfterDispose);
    }
    assert_eq!(module.cached_len(), 0);
    assert!(module.is_disposed());
}

#[test]
fn test_readers_share_cached_entry() {
    let (runtime, host) = setup();
    let module = host.load("Calculator.dll").unwrap();
    let first = module
        .resolve("Demo.Calculator", "Add", binary_i32())
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let module = module.clone();
            thread::spawn(move || {
                (0..100)
                    .map(|_| {
                        module
                            .resolve("Demo.Calculator", "Add", binary_i32())
                            .unwrap()
                    })
                    .last()
            })
        })
        .collect();

    for handle in handles {
        let last = handle.join().unwrap().unwrap();
        assert!(last.same_entry(&first));
    }
    assert_eq!(runtime.calls().get_function_pointer, 1);
}
