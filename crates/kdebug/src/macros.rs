//! 面向使用者的调试宏

/// 按键位输出一条调试日志。
///
/// 第一个参数是键位字符字面量，其余参数与 `format!` 相同。
/// 未启用的键位只花费一次原子读，不会对格式化参数求值。
///
/// # 示例
/// ```ignore
/// kdebug!('a', "process {} exiting with status {}", pid, status);
/// ```
#[macro_export]
macro_rules! kdebug {
    ($key:literal, $($arg:tt)*) => {
        if $crate::debug_enabled($key) {
            $crate::debug_impl($key, core::format_args!($($arg)*));
        }
    };
}
