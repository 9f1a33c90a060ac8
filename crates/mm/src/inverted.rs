//! 倒排页表模块
//!
//! 按需调页变体使用的全局关联映射 `(vpn, pid) → 翻译条目`，
//! 以及其上的物理帧换出协议。与每进程正排页表不同，
//! 倒排页表是系统级单例：所有常驻用户页在这里各有恰好一个条目。
//!
//! ## 换出策略
//!
//! 对插入顺序做 FIFO：换出候选从队首取出；脏的匿名页（栈页/参数页）
//! 不可换出，会被轮转到队尾以保持策略确定且可推进——没有交换文件，
//! 换出它们会丢数据；代码/数据页可以随时从可执行文件重新加载，
//! 不受此限制。正在加载中的帧由缺页路径持有、尚未入表，
//! 天然不会成为换出候选。
//!
//! ## 帧所有权
//!
//! 每个条目持有其物理帧的 [`FrameTracker`]：条目被移除时帧自动
//! 归还空闲池；换出则把跟踪器转交给调用者复用，帧号保持不变。

use crate::address::Vpn;
use crate::frame_allocator::FrameTracker;
use crate::page_table::TranslationEntry;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use hashbrown::HashMap;
use sync::SpinLock;

/// 进程标识符
pub type Pid = u32;

/// 倒排页表的键：虚拟页码加进程号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// 虚拟页码
    pub vpn: Vpn,
    /// 进程号
    pub pid: Pid,
}

impl PageKey {
    /// 创建一个新的键。
    pub fn new(vpn: Vpn, pid: Pid) -> Self {
        PageKey { vpn, pid }
    }
}

/// 一个常驻页：翻译条目加上它所占物理帧的所有权。
#[derive(Debug)]
struct ResidentPage {
    entry: TranslationEntry,
    frame: FrameTracker,
    /// 匿名页（栈/参数页）：没有可执行文件里的后备内容
    anon: bool,
}

lazy_static::lazy_static! {
    /// 全局倒排页表实例，由自旋锁保护。
    pub static ref INVERTED_TABLE: SpinLock<InvertedPageTable> =
        SpinLock::new(InvertedPageTable::new());
}

/// 倒排页表。
///
/// 维护 `(vpn, pid)` 到常驻页的映射和 FIFO 换出顺序。
pub struct InvertedPageTable {
    map: HashMap<PageKey, ResidentPage>,
    /// FIFO 插入序（换出候选顺序）
    order: VecDeque<PageKey>,
}

impl InvertedPageTable {
    /// 创建一个空的倒排页表。
    pub fn new() -> Self {
        InvertedPageTable {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// 常驻页数量。
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 查询某键的翻译条目（拷贝）。
    pub fn get(&self, key: PageKey) -> Option<TranslationEntry> {
        self.map.get(&key).map(|page| page.entry)
    }

    /// 是否存在某键的条目。
    pub fn contains(&self, key: PageKey) -> bool {
        self.map.contains_key(&key)
    }

    /// 插入或替换一个常驻页，并更新换出顺序。
    ///
    /// `entry.ppn` 必须等于 `frame.ppn()`：条目和帧所有权一起登记。
    pub fn insert(&mut self, key: PageKey, entry: TranslationEntry, frame: FrameTracker, anon: bool) {
        assert!(
            entry.ppn == frame.ppn(),
            "inverted: entry ppn does not match owned frame"
        );
        if self.map.insert(key, ResidentPage { entry, frame, anon }).is_some() {
            // 替换时从顺序队列去掉旧位置
            self.order.retain(|k| *k != key);
        }
        self.order.push_back(key);
    }

    /// 把 TLB 写回的访问位/脏位合并到条目上。
    ///
    /// 返回条目是否存在；TLB 有效条目对应的倒排条目缺失
    /// 属于内核不变式被破坏，由调用者断言。
    pub fn write_back(&mut self, key: PageKey, used: bool, dirty: bool) -> bool {
        match self.map.get_mut(&key) {
            Some(page) => {
                page.entry.used = used;
                page.entry.dirty |= dirty;
                true
            }
            None => false,
        }
    }

    /// 选择一个可换出的常驻页，移除其条目并把帧转交给调用者。
    ///
    /// FIFO：队首优先；脏匿名页轮转到队尾（没有交换文件，换出即丢数据）。
    /// 正在进行加载的帧不可能被选中：加载期间帧由缺页路径持有，
    /// 尚未登记进表里。
    ///
    /// 返回 `(被换出的键, 条目, 帧)`；没有可换出候选时返回 None。
    pub fn evict(&mut self) -> Option<(PageKey, TranslationEntry, FrameTracker)> {
        for _ in 0..self.order.len() {
            let key = self.order.pop_front()?;
            let eligible = match self.map.get(&key) {
                Some(page) => !(page.entry.dirty && page.anon),
                // map 和 order 必须一致
                None => panic!("inverted: eviction order references missing entry"),
            };
            if eligible {
                let page = self.map.remove(&key).unwrap();
                return Some((key, page.entry, page.frame));
            }
            self.order.push_back(key);
        }
        None
    }

    /// 某进程当前常驻的页数（诊断/测试用）。
    pub fn resident_pages(&self, pid: Pid) -> usize {
        self.map.keys().filter(|key| key.pid == pid).count()
    }

    /// 移除某进程的全部常驻页，帧随之归还空闲池。返回移除的页数。
    pub fn remove_process(&mut self, pid: Pid) -> usize {
        let victims: Vec<PageKey> = self
            .map
            .keys()
            .filter(|k| k.pid == pid)
            .copied()
            .collect();
        for key in &victims {
            self.map.remove(key);
        }
        self.order.retain(|k| k.pid != pid);
        victims.len()
    }

    /// 清空整个表（内核初始化时调用）。
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }
}

impl Default for InvertedPageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_allocator::{alloc_frame, free_frames};
    use crate::page_table::TranslationEntry;

    fn resident(table: &mut InvertedPageTable, vpn: usize, pid: Pid, anon: bool) -> PageKey {
        let frame = alloc_frame().unwrap();
        let key = PageKey::new(Vpn(vpn), pid);
        let entry = TranslationEntry::new(Vpn(vpn), frame.ppn(), false);
        table.insert(key, entry, frame, anon);
        key
    }

    #[test]
    fn test_insert_and_get() {
        let _g = crate::test_util::setup(8);
        let mut table = InvertedPageTable::new();

        let key = resident(&mut table, 3, 7, false);
        let entry = table.get(key).unwrap();
        assert_eq!(entry.vpn, Vpn(3));
        assert!(entry.valid);

        // 同 vpn 不同 pid 是不同的键
        assert!(table.get(PageKey::new(Vpn(3), 8)).is_none());
    }

    #[test]
    fn test_fifo_eviction_order() {
        let _g = crate::test_util::setup(8);
        let mut table = InvertedPageTable::new();

        let k0 = resident(&mut table, 0, 1, false);
        let k1 = resident(&mut table, 1, 1, false);

        let (victim, _, frame) = table.evict().unwrap();
        assert_eq!(victim, k0);
        drop(frame);

        let (victim, _, _frame) = table.evict().unwrap();
        assert_eq!(victim, k1);
    }

    #[test]
    fn test_dirty_anonymous_pages_not_evicted() {
        let _g = crate::test_util::setup(8);
        let mut table = InvertedPageTable::new();

        let stack = resident(&mut table, 8, 1, true);
        let code = resident(&mut table, 0, 1, false);
        table.write_back(stack, true, true); // 脏匿名页

        // 尽管栈页先插入，换出的必须是代码页
        let (victim, _, _frame) = table.evict().unwrap();
        assert_eq!(victim, code);

        // 只剩脏匿名页时没有可换出候选
        assert!(table.evict().is_none());
        assert!(table.contains(stack));
    }

    #[test]
    fn test_write_back_merges_dirty() {
        let _g = crate::test_util::setup(8);
        let mut table = InvertedPageTable::new();

        let key = resident(&mut table, 2, 1, false);
        assert!(table.write_back(key, true, true));
        // 后续不带脏位的写回不会清掉已有的脏位
        assert!(table.write_back(key, false, false));

        let entry = table.get(key).unwrap();
        assert!(entry.dirty);
        assert!(!entry.used);

        assert!(!table.write_back(PageKey::new(Vpn(9), 9), true, false));
    }

    #[test]
    fn test_remove_process_returns_frames() {
        let _g = crate::test_util::setup(8);
        let mut table = InvertedPageTable::new();
        let before = free_frames();

        resident(&mut table, 0, 1, false);
        resident(&mut table, 1, 1, true);
        resident(&mut table, 0, 2, false);
        assert_eq!(free_frames(), before - 3);

        assert_eq!(table.remove_process(1), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(free_frames(), before - 1);

        // 幸存进程的页不受影响，换出顺序仍一致
        let (victim, _, _frame) = table.evict().unwrap();
        assert_eq!(victim.pid, 2);
    }
}
