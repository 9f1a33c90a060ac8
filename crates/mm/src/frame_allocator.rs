//! 帧分配器模块
//!
//! 本模块提供模拟机器物理页帧的分配和跟踪功能，
//! 即进程共享的空闲帧池：帧号取值于 `[0, numPhysPages)`。
//!
//! ## 分配策略（水位线 + 回收栈）
//!
//! 分配器维护一段可分配的页号区间 `[start, end)`，并使用：
//!
//! - `cur`：水位线指针，表示"尚未被水位线分配过"的起始位置
//! - `recycled`：回收栈，保存已经释放的页号（会排序以便合并）
//!
//! 分配优先级：
//!
//! 1. 优先从 `recycled` 中取出可用页
//! 2. 若回收栈为空，则从 `[cur, end)` 顺序分配并推进水位线
//!
//! 回收时会尝试与水位线前的连续空闲区域合并（将 `cur` 回退）。
//!
//! ## 不变式
//!
//! 任意时刻，每个帧号要么在空闲池中，要么恰好被一个有效的
//! 页表/倒排页表条目（经由 [`FrameTracker`]）持有。重复释放
//! 是内核自身的缺陷，触发硬断言。
//!
//! ## RAII：自动回收
//!
//! [`FrameTracker`] 是单帧 RAII 包装器，`Drop` 时自动回收；
//! 分配路径中途失败时，已经拿到的帧随包装器一起归还。

use crate::address::{PageNum, Ppn, UsizeConvert};
use crate::machine_ops::machine_ops;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use sync::SpinLock;

// ============================================================================
// FrameTracker - 单帧 RAII 封装
// ============================================================================

/// 物理帧跟踪器。
/// 实现了 RAII 模式：当此结构体被 drop 时，它所管理的物理页帧会被自动回收。
#[derive(Debug)]
pub struct FrameTracker(Ppn);

impl FrameTracker {
    /// 创建一个新的 FrameTracker。
    /// 在创建时，会自动将该物理页帧清零。
    fn new(ppn: Ppn) -> Self {
        clear_frame(ppn);
        FrameTracker(ppn)
    }

    /// 获取此帧跟踪器所管理的物理页号 (Ppn)。
    pub fn ppn(&self) -> Ppn {
        self.0
    }
}

impl Drop for FrameTracker {
    /// 自动回收物理页帧。
    fn drop(&mut self) {
        dealloc_frame(self);
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 将指定的物理页帧清零。
fn clear_frame(ppn: Ppn) {
    let page_size = crate::mm_config().page_size();
    machine_ops().fill_phys(ppn.start_addr(), 0, page_size);
}

// ============================================================================
// 全局帧分配器
// ============================================================================

lazy_static! {
    /// 全局物理帧分配器，由自旋锁保护。
    static ref FRAME_ALLOCATOR: SpinLock<FrameAllocator> = SpinLock::new(FrameAllocator::new());
}

/// 物理帧分配器。
/// 采用简单的"延迟分配"策略，并使用回收栈来重用已释放的帧。
pub struct FrameAllocator {
    /// 物理帧的起始 Ppn。
    start: Ppn,
    /// 物理帧的结束 Ppn (不包含)。
    end: Ppn,
    /// 下一个要分配的物理帧 Ppn（水位线）。
    cur: Ppn,
    /// 回收的物理帧堆栈。
    recycled: Vec<Ppn>,
}

impl FrameAllocator {
    /// 创建一个新的帧分配器实例。
    pub fn new() -> Self {
        FrameAllocator {
            // 使用 usize::MAX 作为初始值，表示未初始化状态
            start: Ppn::from_usize(usize::MAX),
            end: Ppn::from_usize(usize::MAX),
            cur: Ppn::from_usize(usize::MAX),
            recycled: Vec::new(),
        }
    }

    /// 初始化帧分配器，设置可用的物理页号范围。
    pub fn init(&mut self, start: Ppn, end: Ppn) {
        self.start = start;
        self.end = end;
        self.cur = start;
        self.recycled.clear();
    }

    /// 分配一个物理帧。
    /// 优先从回收栈中取出，否则从连续未分配区域分配。
    pub fn alloc_frame(&mut self) -> Option<FrameTracker> {
        if let Some(ppn) = self.recycled.pop() {
            // 从回收栈中分配
            Some(FrameTracker::new(ppn))
        } else if self.cur < self.end {
            // 从连续未分配区域分配
            let ppn = self.cur;
            self.cur.step(); // 移动水位线
            Some(FrameTracker::new(ppn))
        } else {
            // 物理内存耗尽
            None
        }
    }

    /// 分配指定数量的物理帧（不保证连续）。
    pub fn alloc_frames(&mut self, num: usize) -> Option<Vec<FrameTracker>> {
        if num > self.free_frames() {
            // 不足额时整体失败，不做部分分配
            return None;
        }
        let mut frames = Vec::with_capacity(num);
        for _ in 0..num {
            if let Some(frame) = self.alloc_frame() {
                frames.push(frame);
            } else {
                // 分配失败，需要将已分配的帧回收
                // 由于 FrameTracker 实现了 Drop，这里直接 drop frames 即可
                return None;
            }
        }
        Some(frames)
    }

    /// 回收一个物理帧。
    /// 尝试将回收的帧与水位线前的连续空闲区域合并。
    fn dealloc_frame(&mut self, frame: &FrameTracker) {
        let ppn = frame.ppn();

        // 帧必须在有效范围内
        assert!(
            ppn >= self.start && ppn < self.end,
            "dealloc_frame: frame out of range"
        );
        // 帧必须处于已分配状态：重复释放是内核缺陷
        assert!(
            ppn < self.cur && self.recycled.iter().all(|&p| p != ppn),
            "dealloc_frame: frame freed twice"
        );

        self.recycled.push(ppn);
        // 对回收栈进行排序，以便于连续合并检查
        self.recycled.sort_unstable();

        if let Some(&last) = self.recycled.last() {
            // 检查回收栈顶部的帧是否是水位线前面的连续帧
            if last.as_usize() + 1 == self.cur.as_usize() {
                // 回收连续帧
                let mut new_cur = last;
                self.recycled.pop();
                while let Some(&top) = self.recycled.last() {
                    if top.as_usize() + 1 == new_cur.as_usize() {
                        new_cur = top;
                        self.recycled.pop();
                    } else {
                        break;
                    }
                }
                self.cur = new_cur;
            }
        }
    }

    /// 获取总的物理帧数
    pub fn total_frames(&self) -> usize {
        self.end.as_usize() - self.start.as_usize()
    }

    /// 获取已分配的帧数
    pub fn allocated_frames(&self) -> usize {
        let watermarked = self.cur.as_usize() - self.start.as_usize();
        watermarked - self.recycled.len()
    }

    /// 获取空闲的帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames() - self.allocated_frames()
    }
}

impl Default for FrameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 公共 API
// ============================================================================

/// 初始化全局帧分配器，覆盖模拟机器的全部物理页 `[0, num_phys_pages)`。
///
/// 重复调用会重置分配器状态（内核启动时调用一次；测试也依赖这一点）。
pub fn init_frame_allocator(num_phys_pages: usize) {
    let mut allocator = FRAME_ALLOCATOR.lock();
    allocator.init(Ppn::from_usize(0), Ppn::from_usize(num_phys_pages));
}

/// 分配一个物理帧。
///
/// # 返回
///
/// 如果分配成功，返回 `Some(FrameTracker)`；否则返回 `None`。
pub fn alloc_frame() -> Option<FrameTracker> {
    FRAME_ALLOCATOR.lock().alloc_frame()
}

/// 分配多个物理帧（不保证连续；不足额时整体失败）。
///
/// # 参数
///
/// * `num` - 需要分配的帧数量。
///
/// # 返回
///
/// 如果分配成功，返回 `Some(Vec<FrameTracker>)`；否则返回 `None`。
pub fn alloc_frames(num: usize) -> Option<Vec<FrameTracker>> {
    FRAME_ALLOCATOR.lock().alloc_frames(num)
}

/// 回收一个物理帧。此函数由 FrameTracker 的 Drop 实现调用。
fn dealloc_frame(frame: &FrameTracker) {
    FRAME_ALLOCATOR.lock().dealloc_frame(frame);
}

/// 获取总的物理帧数
pub fn total_frames() -> usize {
    FRAME_ALLOCATOR.lock().total_frames()
}

/// 获取已分配的帧数
pub fn allocated_frames() -> usize {
    FRAME_ALLOCATOR.lock().allocated_frames()
}

/// 获取空闲的帧数
pub fn free_frames() -> usize {
    FRAME_ALLOCATOR.lock().free_frames()
}
