//! 控制台设备的原始 Mock
//!
//! 脚本化的输入缓冲和捕获式的输出缓冲；所有进程的标准流
//! 共享同一台控制台（与真实机器一致）。

use std::collections::VecDeque;
use std::sync::Mutex;

/// Mock 控制台
pub struct MockConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
}

impl MockConsole {
    const fn new() -> Self {
        MockConsole {
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
        }
    }

    /// 清空两个缓冲。
    pub fn reset(&self) {
        self.input.lock().unwrap().clear();
        self.output.lock().unwrap().clear();
    }

    /// 预置输入字节（用户程序将从 fd 0 读到它们）。
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes.iter().copied());
    }

    /// 从输入缓冲读字节；脚本喂多少读多少。
    pub fn read_input(&self, buf: &mut [u8]) -> usize {
        let mut input = self.input.lock().unwrap();
        let mut count = 0;
        while count < buf.len() {
            match input.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// 追加到输出缓冲。
    pub fn write_output(&self, data: &[u8]) {
        self.output.lock().unwrap().extend_from_slice(data);
    }

    /// 取走并清空已捕获的输出。
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.lock().unwrap())
    }
}

/// 全局 Mock 控制台实例
pub static MOCK_CONSOLE: MockConsole = MockConsole::new();
