//! 模拟机器各外部协作者的原始 Mock
//!
//! mock 只持有状态和原始访问方法；内核各 crate 的 ops trait
//! 在各自的 `cfg(test)` 代码里为这些类型实现（trait 属于对应
//! crate，类型属于本 crate）。

pub mod console;
pub mod fs;
pub mod machine;
