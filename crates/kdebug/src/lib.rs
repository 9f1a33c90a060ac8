//! 内核调试通道
//!
//! 该模块提供一个**按键位过滤**的调试日志通道：每条日志携带一个
//! `char` 键位，只有启用了该键位的日志才会被格式化并输出。
//!
//! 内核约定的键位：
//!
//! - `'a'` —— 进程生命周期事件（创建、加载、退出、回收）
//! - `'v'` —— 虚拟内存事件（TLB 缺失、换出、字符串读取）
//!
//! # 设计概览
//!
//! - **早期过滤**：键位检查在宏展开处发生，未启用的键位只花费一次原子读，
//!   不会对格式化参数求值。
//! - **即时输出**：启用的日志直接交给注册的输出端渲染，由外部消费者决定
//!   呈现方式；本 crate 不做缓冲。
//! - **可实例化**：[`DebugCore`] 封装全部过滤状态，既可作为全局单例，
//!   也可以在测试中独立实例化。
//!
//! # 架构解耦
//!
//! 输出能力通过 [`DebugOutput`] trait 抽象，使用方需要在启动时通过
//! [`register_debug_output`] 注册实现。

#![no_std]

mod debug_core;
pub mod macros;

#[cfg(test)]
mod tests;

pub use debug_core::DebugCore;

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

// ========== Trait 定义 ==========

/// 调试输出 trait
///
/// 实现此 trait 以提供调试日志的输出能力。
/// 使用方需要在启动时通过 [`register_debug_output`] 注册实现。
pub trait DebugOutput: Send + Sync {
    /// 输出字符串
    fn write_str(&self, s: &str);
}

// ========== 全局注册机制 ==========

/// 存储 DebugOutput trait object 的胖指针
struct DebugOutputPtr {
    data: AtomicPtr<()>,
    vtable: AtomicPtr<()>,
}

impl DebugOutputPtr {
    const fn new() -> Self {
        Self {
            data: AtomicPtr::new(core::ptr::null_mut()),
            vtable: AtomicPtr::new(core::ptr::null_mut()),
        }
    }
}

static DEBUG_OUTPUT: DebugOutputPtr = DebugOutputPtr::new();

/// 注册调试输出
///
/// # Safety
///
/// - 必须在任何日志调用之前调用
/// - output 必须具有 'static 生命周期
/// - 只能调用一次
pub unsafe fn register_debug_output(output: &'static dyn DebugOutput) {
    let ptr: *const dyn DebugOutput = output;
    let (data, vtable) = unsafe { core::mem::transmute::<_, (*mut (), *mut ())>(ptr) };
    DEBUG_OUTPUT.data.store(data, Ordering::Release);
    DEBUG_OUTPUT.vtable.store(vtable, Ordering::Release);
}

/// 获取已注册的调试输出
pub(crate) fn get_debug_output() -> Option<&'static dyn DebugOutput> {
    let data = DEBUG_OUTPUT.data.load(Ordering::Acquire);
    let vtable = DEBUG_OUTPUT.vtable.load(Ordering::Acquire);
    if data.is_null() || vtable.is_null() {
        return None;
    }
    // Safety: 指针由 register_debug_output 设置，保证有效
    Some(unsafe {
        core::mem::transmute::<(*mut (), *mut ()), &'static dyn DebugOutput>((data, vtable))
    })
}

// ========== 全局单例 ==========

/// 全局调试通道实例
///
/// 使用 const fn 在编译时初始化，零运行时开销。
/// 所有调试宏和公共 API 都委托给此实例。
static GLOBAL_DEBUG: DebugCore = DebugCore::default();

// ========== 公共 API (精简封装) ==========

/// 核心输出实现（由宏调用）
#[doc(hidden)]
pub fn debug_impl(key: char, args: fmt::Arguments) {
    GLOBAL_DEBUG._debug(key, args);
}

/// 检查键位是否启用（由宏调用）
#[doc(hidden)]
pub fn debug_enabled(key: char) -> bool {
    GLOBAL_DEBUG._key_enabled(key)
}

/// 按标志字符串启用一组键位（例如 `"av"`）
pub fn enable_debug_flags(flags: &str) {
    GLOBAL_DEBUG._enable_flags(flags);
}

/// 禁用所有键位
pub fn clear_debug_flags() {
    GLOBAL_DEBUG._clear_flags();
}
