//! Integration tests for the kdebug public API (macro + global registration).

use std::sync::{Mutex, Once, OnceLock};

use kdebug::{DebugOutput, clear_debug_flags, enable_debug_flags, kdebug};

static INIT: Once = Once::new();

static OUTPUT_BUF: OnceLock<Mutex<String>> = OnceLock::new();

/// The global flag mask is process-wide shared state; serialize the tests.
static SERIAL: Mutex<()> = Mutex::new(());

struct TestOutput;

impl DebugOutput for TestOutput {
    fn write_str(&self, s: &str) {
        let buf = OUTPUT_BUF.get_or_init(|| Mutex::new(String::new()));
        buf.lock().unwrap().push_str(s);
    }
}

static TEST_OUTPUT: TestOutput = TestOutput;

fn init_once() {
    INIT.call_once(|| unsafe {
        kdebug::register_debug_output(&TEST_OUTPUT);
    });
}

fn take_output() -> String {
    let buf = OUTPUT_BUF.get_or_init(|| Mutex::new(String::new()));
    let mut g = buf.lock().unwrap();
    let out = g.clone();
    g.clear();
    out
}

#[test]
fn test_enabled_key_is_rendered() {
    let _s = SERIAL.lock().unwrap();
    init_once();
    clear_debug_flags();
    take_output();

    enable_debug_flags("a");
    kdebug!('a', "process {} exiting with status {}", 3, 7);

    let out = take_output();
    assert_eq!(out, "[a] process 3 exiting with status 7\n");
}

#[test]
fn test_disabled_key_is_silent_and_lazy() {
    let _s = SERIAL.lock().unwrap();
    init_once();
    clear_debug_flags();
    take_output();

    enable_debug_flags("a");

    // 'v' is off: nothing rendered, arguments not evaluated
    let mut evaluated = false;
    kdebug!('v', "value {}", {
        evaluated = true;
        42
    });

    assert!(!evaluated);
    assert_eq!(take_output(), "");
}

#[test]
fn test_long_message_truncated() {
    let _s = SERIAL.lock().unwrap();
    init_once();
    clear_debug_flags();
    take_output();

    enable_debug_flags("v");
    let long = "x".repeat(1000);
    kdebug!('v', "{}", long);

    let out = take_output();
    // "[v] " prefix plus truncated payload, capped at the message limit
    assert!(out.starts_with("[v] xxxx"));
    assert_eq!(out.len(), 256);
}
