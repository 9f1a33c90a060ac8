//! 调试通道核心实现
//!
//! 该模块将键位过滤状态封装到一个单独的 `DebugCore` 结构体中，
//! 可以在保持**无锁**设计的同时，独立实例化用于测试。

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU64, Ordering};

/// 单条日志的格式化上限。
///
/// 超过上限的内容会被截断；调试日志是尽力而为的诊断信息，
/// 截断优于在输出路径上做动态分配。
const MAX_DEBUG_MESSAGE_LENGTH: usize = 256;

/// 核心调试通道
///
/// 封装了键位过滤状态。可以为测试目的而实例化，
/// 或在生产环境中用作全局单例。
///
/// # 线程安全性
///
/// 键位掩码使用两个 `AtomicU64` 覆盖全部 ASCII 键位，
/// 使得整个结构体在线程之间安全共享，无需外部加锁。
pub struct DebugCore {
    /// ASCII 0..64 的键位掩码
    mask_lo: AtomicU64,
    /// ASCII 64..128 的键位掩码
    mask_hi: AtomicU64,
}

impl DebugCore {
    /// 创建一个所有键位都关闭的 DebugCore 实例
    ///
    /// 这是一个 `const fn`，可以在编译时进行评估，
    /// 从而实现零开销的静态初始化。
    pub const fn default() -> Self {
        Self {
            mask_lo: AtomicU64::new(0),
            mask_hi: AtomicU64::new(0),
        }
    }

    /// 按标志字符串启用一组键位
    ///
    /// 非 ASCII 字符会被忽略。
    pub fn _enable_flags(&self, flags: &str) {
        for key in flags.chars() {
            if let Some((lo, bit)) = Self::bit_of(key) {
                if lo {
                    self.mask_lo.fetch_or(bit, Ordering::Release);
                } else {
                    self.mask_hi.fetch_or(bit, Ordering::Release);
                }
            }
        }
    }

    /// 禁用所有键位
    pub fn _clear_flags(&self) {
        self.mask_lo.store(0, Ordering::Release);
        self.mask_hi.store(0, Ordering::Release);
    }

    /// 检查键位是否启用
    #[inline]
    pub fn _key_enabled(&self, key: char) -> bool {
        match Self::bit_of(key) {
            Some((true, bit)) => self.mask_lo.load(Ordering::Acquire) & bit != 0,
            Some((false, bit)) => self.mask_hi.load(Ordering::Acquire) & bit != 0,
            None => false,
        }
    }

    /// 核心输出实现
    ///
    /// 此方法由生产宏（通过全局实例）和测试代码（通过本地实例）调用。
    /// 未启用的键位在此处再次被过滤，因此直接调用也是安全的。
    pub fn _debug(&self, key: char, args: fmt::Arguments) {
        if !self._key_enabled(key) {
            return;
        }

        // 栈上格式化，溢出即截断
        let mut buf = MessageBuffer::new();
        let _ = write!(buf, "[{}] ", key);
        let _ = buf.write_fmt(args);
        let _ = buf.write_str("\n");

        if let Some(output) = crate::get_debug_output() {
            output.write_str(buf.as_str());
        }
    }

    /// 把键位映射到 (低半区?, 位掩码)
    fn bit_of(key: char) -> Option<(bool, u64)> {
        let code = key as u32;
        if code < 64 {
            Some((true, 1u64 << code))
        } else if code < 128 {
            Some((false, 1u64 << (code - 64)))
        } else {
            None
        }
    }
}

/// 固定大小的栈上格式化缓冲区
struct MessageBuffer {
    buf: [u8; MAX_DEBUG_MESSAGE_LENGTH],
    len: usize,
}

impl MessageBuffer {
    fn new() -> Self {
        Self {
            buf: [0; MAX_DEBUG_MESSAGE_LENGTH],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        // Safety: 只有 write_str 写入，内容始终是合法 UTF-8 的前缀
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = MAX_DEBUG_MESSAGE_LENGTH - self.len;
        if remaining == 0 {
            return Ok(());
        }
        // 按字符截断，避免切断多字节序列
        let mut take = s.len().min(remaining);
        while take > 0 && !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}
