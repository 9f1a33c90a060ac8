//! 用户进程核心
//!
//! 在软件模拟的 MIPS 处理器上把用户二进制**作为进程运行起来**的
//! 全部内核逻辑：加载 COFF 映像、建立地址空间、代表内核翻译用户
//! 虚拟地址、处理系统调用（进程生命周期、标准 I/O），以及在按需
//! 调页变体中通过倒排页表处理 TLB 缺失。
//!
//! 模拟处理器本身、线程调度器、COFF 解析器、控制台设备和宿主
//! 文件系统都是外部协作者，经由 [`machine`] 模块中的 trait 接口
//! 消费；嵌入方在启动时注册实现。
//!
//! # 启动顺序
//!
//! 1. 注册 `sync`、`mm` 和本 crate 的全部机器接口
//! 2. [`kernel::init`] 选择变体并初始化帧池
//! 3. 创建根进程并 [`kernel::process::Process::execute`] 首个程序
//! 4. 机器把用户态异常送进 [`trap::handle_exception`]

#![no_std]

extern crate alloc;

pub mod kernel;
pub mod machine;
pub mod mm;
pub mod trap;

#[cfg(test)]
pub(crate) mod test_util;

pub use kernel::process::Process;
