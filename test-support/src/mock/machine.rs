//! 模拟机器的原始 Mock
//!
//! 一台"纸面机器"：中断标志、38 个用户寄存器、物理内存向量、
//! TLB 槽位和常驻页表寄存器。翻译条目以本 crate 的
//! [`RawTlbEntry`] 表示，由消费方在自己的 trait 实现里与内核
//! 类型互转。
//!
//! 中断线的 `sync::ArchOps` 在这里实现（`sync` 位于依赖栈底，
//! 所有测试共享同一份拷贝）。

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 机器的固定页大小
pub const PAGE_SIZE: usize = 4096;
/// Mock 机器的默认 TLB 槽位数
pub const TLB_SIZE: usize = 4;
/// 用户寄存器总数（与模拟处理器一致）
pub const NUM_USER_REGISTERS: usize = 38;

/// 一个原始翻译条目
///
/// 字段与 MIPS 软件管理 TLB 的条目一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTlbEntry {
    pub vpn: usize,
    pub ppn: usize,
    pub valid: bool,
    pub read_only: bool,
    pub used: bool,
    pub dirty: bool,
}

impl RawTlbEntry {
    /// 无效条目。
    pub const fn invalid() -> Self {
        RawTlbEntry {
            vpn: 0,
            ppn: 0,
            valid: false,
            read_only: false,
            used: false,
            dirty: false,
        }
    }
}

/// Mock 机器
pub struct MockMachine {
    interrupts: AtomicUsize,
    registers: Mutex<[u32; NUM_USER_REGISTERS]>,
    memory: Mutex<Vec<u8>>,
    tlb: Mutex<Vec<RawTlbEntry>>,
    page_table: Mutex<Vec<RawTlbEntry>>,
    halted: AtomicBool,
    num_phys_pages: AtomicUsize,
    tlb_size: AtomicUsize,
}

impl MockMachine {
    const fn new() -> Self {
        MockMachine {
            interrupts: AtomicUsize::new(1),
            registers: Mutex::new([0; NUM_USER_REGISTERS]),
            memory: Mutex::new(Vec::new()),
            tlb: Mutex::new(Vec::new()),
            page_table: Mutex::new(Vec::new()),
            halted: AtomicBool::new(false),
            num_phys_pages: AtomicUsize::new(0),
            tlb_size: AtomicUsize::new(0),
        }
    }

    /// 把机器重置为一台干净的机器。
    pub fn reset(&self, num_phys_pages: usize, tlb_size: usize) {
        self.interrupts.store(1, Ordering::SeqCst);
        *self.registers.lock().unwrap() = [0; NUM_USER_REGISTERS];
        *self.memory.lock().unwrap() = vec![0; num_phys_pages * PAGE_SIZE];
        *self.tlb.lock().unwrap() = vec![RawTlbEntry::invalid(); tlb_size];
        self.page_table.lock().unwrap().clear();
        self.halted.store(false, Ordering::SeqCst);
        self.num_phys_pages.store(num_phys_pages, Ordering::SeqCst);
        self.tlb_size.store(tlb_size, Ordering::SeqCst);
    }

    // ========== 寄存器 ==========

    /// 读用户寄存器。
    pub fn reg(&self, r: usize) -> u32 {
        self.registers.lock().unwrap()[r]
    }

    /// 写用户寄存器。
    pub fn set_reg(&self, r: usize, value: u32) {
        self.registers.lock().unwrap()[r] = value;
    }

    /// 前进一条指令：`registers[pc] ← registers[next_pc]`，后者加 4。
    pub fn step_pc(&self, pc: usize, next_pc: usize) {
        let mut registers = self.registers.lock().unwrap();
        registers[pc] = registers[next_pc];
        registers[next_pc] = registers[next_pc].wrapping_add(4);
    }

    // ========== 物理内存 ==========

    /// 物理页数。
    pub fn num_phys_pages(&self) -> usize {
        self.num_phys_pages.load(Ordering::SeqCst)
    }

    /// 读物理内存。
    pub fn read_memory(&self, paddr: usize, buf: &mut [u8]) {
        let memory = self.memory.lock().unwrap();
        buf.copy_from_slice(&memory[paddr..paddr + buf.len()]);
    }

    /// 写物理内存。
    pub fn write_memory(&self, paddr: usize, data: &[u8]) {
        let mut memory = self.memory.lock().unwrap();
        memory[paddr..paddr + data.len()].copy_from_slice(data);
    }

    /// 以同一字节填充一段物理内存。
    pub fn fill_memory(&self, paddr: usize, byte: u8, len: usize) {
        let mut memory = self.memory.lock().unwrap();
        memory[paddr..paddr + len].fill(byte);
    }

    // ========== TLB 与页表寄存器 ==========

    /// TLB 槽位数。
    pub fn tlb_size(&self) -> usize {
        self.tlb_size.load(Ordering::SeqCst)
    }

    /// 读 TLB 槽位。
    pub fn tlb_entry(&self, slot: usize) -> RawTlbEntry {
        self.tlb.lock().unwrap()[slot]
    }

    /// 写 TLB 槽位。
    pub fn set_tlb_entry(&self, slot: usize, entry: RawTlbEntry) {
        self.tlb.lock().unwrap()[slot] = entry;
    }

    /// 常驻模式：指定进程页表。
    pub fn set_page_table(&self, entries: Vec<RawTlbEntry>) {
        *self.page_table.lock().unwrap() = entries;
    }

    /// 常驻页表寄存器的当前内容。
    pub fn loaded_page_table(&self) -> Vec<RawTlbEntry> {
        self.page_table.lock().unwrap().clone()
    }

    // ========== 停机 ==========

    /// 停机标志。
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// 置停机标志。
    pub fn set_halted(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

/// 全局 Mock 机器实例
pub static MOCK_MACHINE: MockMachine = MockMachine::new();

impl sync::ArchOps for MockMachine {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.interrupts.swap(0, Ordering::SeqCst)
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupts.store(flags, Ordering::SeqCst);
    }
}
