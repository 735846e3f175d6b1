//! Capture and resolve this test binary's own stack with the native backend
#![cfg(all(
    not(feature = "minimal"),
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]

use std::hint::black_box;

use callscope::{capture_stack, init_callstack, Callstack, CallstackConfig, RawCallstack, UNKNOWN};

#[inline(never)]
fn a_frame() -> RawCallstack {
    let stack = b_frame();
    black_box(&stack);
    stack
}

#[inline(never)]
fn b_frame() -> RawCallstack {
    let stack = c_frame();
    black_box(&stack);
    stack
}

#[inline(never)]
fn c_frame() -> RawCallstack {
    let stack = capture_stack(64);
    black_box(&stack);
    stack
}

/// Index of the first entry whose name contains `function`, over all
/// resolved entries of the stack in order
fn position_of(names: &[String], function: &str) -> Option<usize> {
    names.iter().position(|name| name.contains(function))
}

#[test]
fn test_chain_resolves_in_call_order() {
    let stack = a_frame();
    assert!(!stack.is_empty());

    let mut callstack = Callstack::init();
    let mut names = Vec::new();
    let mut files = Vec::new();
    for addr in stack.addresses() {
        for entry in callstack.resolve(addr).iter() {
            names.push(entry.name.to_string());
            files.push((entry.file.to_string(), entry.line));
        }
    }

    let c = position_of(&names, "c_frame").expect("c_frame not resolved");
    let b = position_of(&names, "b_frame").expect("b_frame not resolved");
    let a = position_of(&names, "a_frame").expect("a_frame not resolved");
    assert!(c < b && b < a, "unexpected order: {names:#?}");

    for idx in [a, b, c] {
        let (file, line) = &files[idx];
        assert!(file.ends_with("test_end_to_end.rs"), "frame {} at {file}", names[idx]);
        assert!(*line > 0);
    }
}

#[test]
fn test_fast_resolution_names_function() {
    let stack = c_frame();
    let mut callstack = Callstack::init();

    let found = stack.addresses().any(|addr| callstack.resolve_fast(addr).contains("c_frame"));
    assert!(found);
}

#[test]
fn test_own_executable_is_cached() {
    let mut callstack = Callstack::init();
    assert!(callstack.enumerate_modules() > 0);

    let here = test_own_executable_is_cached as usize as u64;
    let entry = callstack.module_cache().lookup(here).expect("test binary not cached");
    assert!(entry.name().starts_with('[') && entry.name().ends_with(']'));
    assert_ne!(entry.name(), UNKNOWN);
}

#[test]
fn test_global_instance_is_shared() {
    let first = init_callstack();
    let second = init_callstack();
    assert!(std::ptr::eq(first, second));
    assert!(callscope::callstack().is_some_and(|global| std::ptr::eq(global, first)));

    let stack = c_frame();
    let mut callstack = first.lock().unwrap();
    let addr = stack.addresses().next().unwrap();
    assert!(!callstack.resolve(addr).is_empty());
}

#[test]
fn test_frames_without_debug_info_use_module_location() {
    let stack = c_frame();
    let config = CallstackConfig { debug_info: false, ..CallstackConfig::default() };
    let mut callstack = Callstack::with_config(&config);

    assert!(!stack.is_empty());
    for addr in stack.addresses() {
        let entries = callstack.resolve(addr);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.line, 0);
        assert!(!entry.name.is_empty());
        assert!(entry.file.starts_with('['), "{entry}");
        assert!(entry.file.ends_with(&format!(" [0x{addr:x}]")), "{entry}");
    }
}

#[test]
fn test_unmapped_address_is_unknown() {
    let mut callstack = Callstack::init();

    let entries = callstack.resolve(0x10);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, UNKNOWN);
    assert_eq!(entries[0].file, "[unknown] [0x10]");
    assert_eq!(entries[0].line, 0);
    drop(entries);
    assert_eq!(callstack.resolve_fast(0x10), "");
}

#[test]
#[ignore] // Depends on libc being installed without debug info
fn test_libc_frames_fall_back_to_symbols() {
    extern "C" fn compare(a: *const libc::c_void, b: *const libc::c_void) -> libc::c_int {
        if CAPTURED.with(|cell| cell.borrow().is_none()) {
            CAPTURED.with(|cell| *cell.borrow_mut() = Some(capture_stack(16)));
        }
        // SAFETY: qsort passes pointers into the i32 array below.
        let (a, b) = unsafe { (*a.cast::<i32>(), *b.cast::<i32>()) };
        a.cmp(&b) as libc::c_int
    }

    thread_local! {
        static CAPTURED: std::cell::RefCell<Option<RawCallstack>> = const { std::cell::RefCell::new(None) };
    }

    let mut values = [3i32, 1, 2];
    // SAFETY: the array and element size match, compare reads only i32s.
    unsafe {
        libc::qsort(values.as_mut_ptr().cast(), values.len(), std::mem::size_of::<i32>(), Some(compare));
    }
    assert_eq!(values, [1, 2, 3]);

    let stack = CAPTURED.with(|cell| cell.borrow_mut().take()).expect("comparator never ran");
    let mut callstack = Callstack::init();
    let fallback = stack.addresses().find_map(|addr| {
        let entries = callstack.resolve(addr);
        let entry = &entries[0];
        (entry.line == 0 && entry.file.contains("libc")).then(|| entry.file.to_string())
    });
    let location = fallback.expect("no libc frame without debug info");
    assert!(location.contains(" [0x"), "{location}");
}
