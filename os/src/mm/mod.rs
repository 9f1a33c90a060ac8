//! 地址空间策略
//!
//! 基础类型（地址、帧分配器、页表、倒排页表）由独立的 `mm` crate
//! 提供；本模块把它们组合成进程的两种地址空间变体：
//!
//! - [`AddressSpace::Resident`] —— 常驻式：加载时一次性分配全部
//!   帧、填满正排页表，处理器直接用页表翻译。
//! - [`AddressSpace::DemandPaged`] —— 按需调页：加载时不分配帧，
//!   页在第一次被触碰时经由全局倒排页表物化，TLB 由内核软件
//!   重填（见 [`tlb`]）。
//!
//! 异常入口和拷贝引擎对变体做 match，而不是虚表分发。

pub mod tlb;

#[cfg(test)]
mod tests;

// Re-export mm crate 的常用类型
pub use mm::frame_allocator::init_frame_allocator;
pub use mm::page_table::{PageTable, TranslationEntry};

use crate::machine::coff::CoffImage;
use kdebug::kdebug;
use mm::page_table::{PagingError, PagingResult};
use mm::{INVERTED_TABLE, PageKey, Pid, UsizeConvert, Vpn, alloc_frames, machine_ops};

/// 进程地址空间：常驻或按需调页。
pub enum AddressSpace {
    /// 常驻式：进程独占其正排页表和全部帧
    Resident {
        /// 进程页表，VPN 区间 `[0, numPages)`
        table: PageTable,
    },
    /// 按需调页：常驻页登记在全局倒排页表里
    DemandPaged,
}

impl AddressSpace {
    /// VPN 是否可用于访问。
    ///
    /// 常驻式要求条目存在且有效；按需调页只要求 VPN 落在地址
    /// 空间内（页不在也可以缺进来）。
    pub fn check_valid_vpn(&self, vpn: Vpn, num_pages: usize) -> bool {
        match self {
            AddressSpace::Resident { table } => {
                table.entry(vpn).map(|entry| entry.valid).unwrap_or(false)
            }
            AddressSpace::DemandPaged => vpn.as_usize() < num_pages,
        }
    }

    /// 解析 VPN 到翻译条目。
    ///
    /// 按需调页变体在页缺席时就地把它物化；`is_current` 决定要不
    /// 要经过 TLB——只有当前运行进程的访问才允许触碰 TLB，代别的
    /// 进程做的内核拷贝（例如 exec 写子进程的 argv）直接走倒排
    /// 页表。
    pub fn translate_vpn(
        &mut self,
        vpn: Vpn,
        pid: Pid,
        is_current: bool,
        coff: Option<&dyn CoffImage>,
    ) -> PagingResult<TranslationEntry> {
        match self {
            AddressSpace::Resident { table } => {
                let entry = table.entry(vpn).ok_or(PagingError::NotMapped)?;
                if !entry.valid {
                    return Err(PagingError::NotMapped);
                }
                Ok(*entry)
            }
            AddressSpace::DemandPaged => {
                let coff = coff.ok_or(PagingError::NotMapped)?;
                if is_current {
                    // 先看 TLB，缺了走统一的重填路径
                    if let Some(entry) = tlb::lookup(vpn) {
                        return Ok(entry);
                    }
                    Ok(tlb::bring_page(pid, vpn, coff))
                } else {
                    let key = PageKey::new(vpn, pid);
                    if let Some(entry) = INVERTED_TABLE.lock().get(key) {
                        return Ok(entry);
                    }
                    Ok(tlb::fault_in(pid, vpn, coff))
                }
            }
        }
    }

    /// 搬运完成后更新访问位；写访问还要置脏位。
    ///
    /// 读不清除已有的脏位。
    pub fn update_access_bits(&mut self, vpn: Vpn, pid: Pid, is_current: bool, is_write: bool) {
        match self {
            AddressSpace::Resident { table } => {
                if let Some(entry) = table.entry_mut(vpn) {
                    entry.used = true;
                    entry.dirty |= is_write;
                }
            }
            AddressSpace::DemandPaged => {
                if is_current && tlb::update_entry(vpn, is_write) {
                    return;
                }
                // 不在 TLB（或不是当前进程）：直接写倒排页表
                let updated =
                    INVERTED_TABLE
                        .lock()
                        .write_back(PageKey::new(vpn, pid), true, is_write);
                assert!(updated, "access bits for a page that is not resident");
            }
        }
    }

    /// 加载各段，建立初始地址空间。
    pub fn load_sections(&mut self, pid: Pid, coff: &dyn CoffImage, num_pages: usize) -> bool {
        match self {
            AddressSpace::Resident { table } => {
                let Some(frames) = alloc_frames(num_pages) else {
                    kdebug!('a', "\tinsufficient physical memory");
                    return false;
                };
                kdebug!('a', "process {} needs {} pages", pid, num_pages);

                *table = PageTable::from_frames(frames);

                for s in 0..coff.num_sections() {
                    let section = coff.section(s);
                    kdebug!(
                        'a',
                        "\tinitializing {} section ({} pages)",
                        section.name,
                        section.length
                    );
                    for i in 0..section.length {
                        let vpn = Vpn(section.first_vpn + i);
                        table.set_read_only(vpn, section.read_only());
                        coff.load_page(s, i, table.entry(vpn).expect("section vpn in range").ppn);
                    }
                }
                true
            }
            // 按需调页：页到第一次触碰时才物化
            AddressSpace::DemandPaged => true,
        }
    }

    /// 释放地址空间占用的全部帧，返回归还的帧数。
    pub fn unload_sections(&mut self, pid: Pid) -> usize {
        match self {
            AddressSpace::Resident { table } => table.release_frames(),
            AddressSpace::DemandPaged => {
                // 本进程即当前进程：TLB 里它的条目即将失去后备，全部失效
                tlb::invalidate_all_slots();
                INVERTED_TABLE.lock().remove_process(pid)
            }
        }
    }

    /// 上下文切换进来时恢复地址空间状态。
    ///
    /// 常驻式把页表指给处理器；按需调页把上一个进程的 TLB 条目
    /// 写回倒排页表并全部失效（TLB 是按 pid 的缓存，必须切换）。
    pub fn restore_state(&self, prev_pid: Option<Pid>) {
        match self {
            AddressSpace::Resident { table } => machine_ops().set_page_table(table.entries()),
            AddressSpace::DemandPaged => tlb::flush_for_switch(prev_pid),
        }
    }
}
