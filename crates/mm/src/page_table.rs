//! 进程页表模块
//!
//! 本模块定义了 MIPS 软件管理 TLB 所使用的翻译条目
//! ([`TranslationEntry`])，以及常驻式进程的正排页表
//! ([`PageTable`])：按 VPN 索引、长度为 `numPages` 的条目序列。
//!
//! ## 所有权
//!
//! 页表独占其全部物理帧：每个有效条目的 ppn 同时由一个
//! [`FrameTracker`] 跟踪，页表被释放时每个帧恰好归还空闲池一次。
//! 这使得加载中途失败不会泄漏任何帧。

use crate::address::{Ppn, UsizeConvert, Vpn};
use crate::frame_allocator::FrameTracker;
use alloc::vec::Vec;

/// 分页操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// 虚拟页码不在进程地址空间内，或条目无效
    NotMapped,
    /// 提供了无效的地址
    InvalidAddress,
    /// 目标页只读
    ReadOnlyPage,
    /// 帧（Frame）分配失败
    FrameAllocFailed,
    /// 没有可换出的物理帧
    NoEvictableFrame,
}

/// 分页操作的结果类型
pub type PagingResult<T> = Result<T, PagingError>;

/// 翻译条目
///
/// 字段含义与 MIPS 软件管理 TLB 的条目一致；同一结构同时用于
/// 进程页表、倒排页表和 TLB 槽位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    /// 虚拟页码
    pub vpn: Vpn,
    /// 物理页码
    pub ppn: Ppn,
    /// 条目是否有效
    pub valid: bool,
    /// 页是否只读
    pub read_only: bool,
    /// 访问位，由内核代访问和处理器访问置位
    pub used: bool,
    /// 脏位，写访问置位
    pub dirty: bool,
}

impl TranslationEntry {
    /// 创建一个有效的翻译条目，访问位和脏位清零。
    pub fn new(vpn: Vpn, ppn: Ppn, read_only: bool) -> Self {
        TranslationEntry {
            vpn,
            ppn,
            valid: true,
            read_only,
            used: false,
            dirty: false,
        }
    }

    /// 创建一个无效条目（TLB 槽位的初始/失效状态）。
    pub fn invalid() -> Self {
        TranslationEntry {
            vpn: Vpn(0),
            ppn: Ppn(0),
            valid: false,
            read_only: false,
            used: false,
            dirty: false,
        }
    }
}

/// 常驻式进程页表
///
/// 将进程的 VPN 区间 `[0, numPages)` 映射到翻译条目，
/// 并持有对应物理帧的所有权。
#[derive(Debug, Default)]
pub struct PageTable {
    entries: Vec<TranslationEntry>,
    frames: Vec<FrameTracker>,
}

impl PageTable {
    /// 创建一个空页表（尚未加载任何段）。
    pub fn empty() -> Self {
        PageTable {
            entries: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// 用一组已分配的帧构建页表：`vpn` 依次映射到 `frames[vpn]`，
    /// 所有条目初始为有效、可写。
    pub fn from_frames(frames: Vec<FrameTracker>) -> Self {
        let entries = frames
            .iter()
            .enumerate()
            .map(|(vpn, frame)| TranslationEntry::new(Vpn(vpn), frame.ppn(), false))
            .collect();
        PageTable { entries, frames }
    }

    /// 页表长度（numPages）。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 页表是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全部条目。
    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    /// 获取 VPN 对应的条目（范围外返回 None）。
    pub fn entry(&self, vpn: Vpn) -> Option<&TranslationEntry> {
        self.entries.get(vpn.as_usize())
    }

    /// 获取 VPN 对应的条目（可变）。
    pub fn entry_mut(&mut self, vpn: Vpn) -> Option<&mut TranslationEntry> {
        self.entries.get_mut(vpn.as_usize())
    }

    /// 设置某页的只读位。
    pub fn set_read_only(&mut self, vpn: Vpn, read_only: bool) {
        if let Some(entry) = self.entries.get_mut(vpn.as_usize()) {
            entry.read_only = read_only;
        }
    }

    /// 释放全部条目和物理帧，返回归还的帧数。
    ///
    /// 每个帧经由 [`FrameTracker`] 的 Drop 恰好归还空闲池一次；
    /// 重复释放会触发空闲池的断言。
    pub fn release_frames(&mut self) -> usize {
        let released = self.frames.len();
        self.entries.clear();
        self.frames.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_allocator::{alloc_frames, free_frames};

    #[test]
    fn test_from_frames_layout() {
        let _g = crate::test_util::setup(16);
        let frames = alloc_frames(4).unwrap();
        let table = PageTable::from_frames(frames);

        assert_eq!(table.len(), 4);
        for vpn in 0..4 {
            let e = table.entry(Vpn(vpn)).unwrap();
            assert_eq!(e.vpn, Vpn(vpn));
            assert!(e.valid);
            assert!(!e.read_only);
            assert!(!e.used);
            assert!(!e.dirty);
        }
        assert!(table.entry(Vpn(4)).is_none());
    }

    #[test]
    fn test_release_returns_frames() {
        let _g = crate::test_util::setup(16);
        let before = free_frames();

        let mut table = PageTable::from_frames(alloc_frames(5).unwrap());
        assert_eq!(free_frames(), before - 5);

        assert_eq!(table.release_frames(), 5);
        assert_eq!(free_frames(), before);
        assert!(table.is_empty());
    }

    #[test]
    fn test_unique_ppns() {
        let _g = crate::test_util::setup(16);
        let table = PageTable::from_frames(alloc_frames(8).unwrap());

        let mut seen: alloc::vec::Vec<usize> =
            table.entries().iter().map(|e| e.ppn.as_usize()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 8);
    }
}
