//! 内存管理子系统
//!
//! 提供地址抽象、物理帧分配、进程页表和倒排页表功能。
//!
//! 这里的"物理内存"是模拟机器的物理内存数组，"TLB"是模拟处理器的
//! 全相联软件重填翻译缓存；本 crate 不直接触碰它们，
//! 而是通过注册的机器接口访问。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与模拟机器解耦：
//! - [`MachineMmOps`]: 物理内存读写、TLB 槽位读写、物理页数
//! - [`MmConfig`]: 页大小常量
//!
//! 使用前必须调用 [`register_machine_ops`] 和 [`register_config`] 注册实现。
//!
//! # 典型初始化顺序（由 os crate 驱动）
//!
//! 1. `register_machine_ops(...)`：注册模拟机器的内存接口
//! 2. `register_config(...)`：注册页大小
//! 3. `frame_allocator::init_frame_allocator(machine_ops().num_phys_pages())`
//!
//! 随后即可构建进程页表（[`page_table`]）或使用倒排页表（[`inverted`]）。

#![no_std]

extern crate alloc;

mod config;
mod machine_ops;

#[cfg(test)]
pub(crate) mod test_util;

pub mod address;
pub mod frame_allocator;
pub mod inverted;
pub mod page_table;

pub use config::{MmConfig, mm_config, register_config};
pub use machine_ops::{MachineMmOps, machine_ops, register_machine_ops};

// Re-export 常用类型
pub use address::{Paddr, PageNum, Ppn, PpnRange, UsizeConvert, Vaddr, Vpn, VpnRange};
pub use frame_allocator::{FrameTracker, alloc_frame, alloc_frames};
pub use inverted::{INVERTED_TABLE, InvertedPageTable, PageKey, Pid};
pub use page_table::{PageTable, PagingError, PagingResult, TranslationEntry};
