//! 本 crate 测试的机器桥接
//!
//! test-support 的 mock 只持有原始状态；这里为它实现本 crate 的
//! ops trait、完成一次性注册，并提供每个用例的标准开场。

use crate::address::{Paddr, Ppn, UsizeConvert, Vpn};
use crate::page_table::TranslationEntry;
use core::sync::atomic::{AtomicBool, Ordering};
use test_support::mock::machine::{MOCK_MACHINE, MockMachine, RawTlbEntry};

/// 每个用例的标准开场：串行化、注册、重置。
pub(crate) fn setup(num_phys_pages: usize) -> test_support::SerialGuard {
    static REGISTERED: AtomicBool = AtomicBool::new(false);

    let guard = test_support::serial();

    if !REGISTERED.swap(true, Ordering::SeqCst) {
        unsafe {
            sync::register_arch_ops(&MOCK_MACHINE);
            crate::register_machine_ops(&MOCK_MACHINE);
            crate::register_config(&MOCK_MM_CONFIG);
        }
    }

    // 先丢弃旧常驻页（帧回到旧的池状态），再重置机器和帧池
    crate::inverted::INVERTED_TABLE.lock().clear();
    MOCK_MACHINE.reset(num_phys_pages, test_support::TLB_SIZE);
    crate::frame_allocator::init_frame_allocator(num_phys_pages);

    guard
}

fn from_raw(raw: RawTlbEntry) -> TranslationEntry {
    TranslationEntry {
        vpn: Vpn(raw.vpn),
        ppn: Ppn(raw.ppn),
        valid: raw.valid,
        read_only: raw.read_only,
        used: raw.used,
        dirty: raw.dirty,
    }
}

fn to_raw(entry: TranslationEntry) -> RawTlbEntry {
    RawTlbEntry {
        vpn: entry.vpn.as_usize(),
        ppn: entry.ppn.as_usize(),
        valid: entry.valid,
        read_only: entry.read_only,
        used: entry.used,
        dirty: entry.dirty,
    }
}

impl crate::MachineMmOps for MockMachine {
    fn num_phys_pages(&self) -> usize {
        MockMachine::num_phys_pages(self)
    }

    fn tlb_size(&self) -> usize {
        MockMachine::tlb_size(self)
    }

    fn read_phys(&self, paddr: Paddr, buf: &mut [u8]) {
        self.read_memory(paddr.as_usize(), buf);
    }

    fn write_phys(&self, paddr: Paddr, data: &[u8]) {
        self.write_memory(paddr.as_usize(), data);
    }

    fn fill_phys(&self, paddr: Paddr, byte: u8, len: usize) {
        self.fill_memory(paddr.as_usize(), byte, len);
    }

    fn read_tlb_entry(&self, slot: usize) -> TranslationEntry {
        from_raw(self.tlb_entry(slot))
    }

    fn write_tlb_entry(&self, slot: usize, entry: TranslationEntry) {
        self.set_tlb_entry(slot, to_raw(entry));
    }

    fn set_page_table(&self, entries: &[TranslationEntry]) {
        MockMachine::set_page_table(self, entries.iter().map(|e| to_raw(*e)).collect());
    }
}

/// Mock 的内存管理配置
struct MockMmConfig;

impl crate::MmConfig for MockMmConfig {
    fn page_size(&self) -> usize {
        test_support::PAGE_SIZE
    }
}

static MOCK_MM_CONFIG: MockMmConfig = MockMmConfig;
