//! TLB 软件重填与缺页物化
//!
//! 模拟处理器的 TLB 是一块小的全相联缓存，缺失时陷入内核由
//! 软件重填。重填协议（整个过程关中断）：
//!
//! 1. 选一个 TLB 槽位：优先第一个无效槽，否则均匀随机挑一个
//! 2. 把受害槽的访问位/脏位写回倒排页表（有效槽必有对应条目）
//! 3. 查倒排页表 `(vpn, pid)`：命中则装入槽位；缺失则取一个
//!    物理帧（空闲池优先，否则换出一个常驻页）、从 COFF 段物化
//!    页内容（无段覆盖的页清零——栈页或参数页）、插表、装槽
//!
//! TLB 是按 pid 的缓存：上下文切换时全部失效；换出当前进程的
//! 常驻页时，缓存它的槽位同步失效，防止槽位继续映到被复用的帧。

use crate::kernel;
use crate::kernel::process::Process;
use crate::machine::coff::CoffImage;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use kdebug::kdebug;
use mm::page_table::TranslationEntry;
use mm::{
    INVERTED_TABLE, PageKey, PageNum, Pid, UsizeConvert, Vaddr, Vpn, alloc_frame, machine_ops,
    mm_config,
};

/// TLB 缺失的入口。
///
/// 返回是否成功处理；VPN 落在地址空间之外属于地址翻译失败，
/// 由异常入口击杀进程。
pub(crate) fn handle_tlb_miss(proc: &Arc<Process>, bad_vaddr: Vaddr) -> bool {
    let vpn = Vpn::from_addr_floor(bad_vaddr);

    let mut inner = proc.inner.lock();
    let inner = &mut *inner;

    if !inner.space.check_valid_vpn(vpn, inner.num_pages) {
        return false;
    }

    kdebug!('v', "tlb miss: process {} vpn {}", proc.pid(), vpn.as_usize());

    let coff = inner.coff.as_deref().expect("TLB miss before image loaded");
    bring_page(proc.pid(), vpn, coff);
    true
}

/// 在 TLB 里查找当前进程的某个 VPN（只认有效槽）。
pub(crate) fn lookup(vpn: Vpn) -> Option<TranslationEntry> {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        let entry = ops.read_tlb_entry(slot);
        if entry.valid && entry.vpn == vpn {
            return Some(entry);
        }
    }
    None
}

/// 重填协议主体：选槽、写回、命中装槽或缺页物化。
///
/// 返回装入 TLB 的条目。
pub(crate) fn bring_page(pid: Pid, vpn: Vpn, coff: &dyn CoffImage) -> TranslationEntry {
    let key = PageKey::new(vpn, pid);

    let slot = find_slot_to_evict();
    write_slot_back(slot, pid);

    let resident = INVERTED_TABLE.lock().get(key);
    let entry = match resident {
        // 页表命中：页在内存里，只是不在 TLB
        Some(entry) => entry,
        // 页表缺失：物化这一页
        None => fault_in(pid, vpn, coff),
    };

    machine_ops().write_tlb_entry(slot, entry);
    entry
}

/// 把一页物化进物理内存并登记到倒排页表。
///
/// 帧来源：空闲池优先，耗尽时换出一个常驻页（FIFO，跳过脏
/// 匿名页）。页内容：有 COFF 段覆盖的从段加载，否则清零
/// （匿名页：栈或参数页）。
pub(crate) fn fault_in(pid: Pid, vpn: Vpn, coff: &dyn CoffImage) -> TranslationEntry {
    let frame = match alloc_frame() {
        Some(frame) => frame,
        None => {
            // 换出决策依赖倒排页表里的脏位；当前进程的脏位可能
            // 还攒在 TLB 里，先整体写回
            if let Some(current) = kernel::current_pid() {
                sync_tlb_bits(current);
            }

            let (victim, victim_entry, frame) = INVERTED_TABLE
                .lock()
                .evict()
                .expect("vm: out of evictable frames");
            kdebug!(
                'v',
                "evicted (vpn {}, pid {}) from frame {}",
                victim.vpn.as_usize(),
                victim.pid,
                victim_entry.ppn.as_usize()
            );

            // 换出的是当前进程的页时，同步失效缓存它的 TLB 槽位
            if kernel::current_pid() == Some(victim.pid) {
                invalidate_slot_for(victim.vpn);
            }
            frame
        }
    };

    // 换出复用的帧带着旧内容，先清零
    let ppn = frame.ppn();
    machine_ops().fill_phys(ppn.start_addr(), 0, mm_config().page_size());

    // 找覆盖此 VPN 的段；段连续排布，只需检查上界
    let mut read_only = false;
    let mut anon = true;
    for s in 0..coff.num_sections() {
        let section = coff.section(s);
        if vpn.as_usize() < section.first_vpn + section.length {
            let spage = vpn.as_usize() - section.first_vpn;
            coff.load_page(s, spage, ppn);
            read_only = section.read_only();
            anon = false;
            break;
        }
    }

    let entry = TranslationEntry::new(vpn, ppn, read_only);
    INVERTED_TABLE
        .lock()
        .insert(PageKey::new(vpn, pid), entry, frame, anon);

    kdebug!(
        'v',
        "faulted in (vpn {}, pid {}) -> frame {}{}",
        vpn.as_usize(),
        pid,
        ppn.as_usize(),
        if anon { " (anonymous)" } else { "" }
    );
    entry
}

/// 更新当前进程某 VPN 的 TLB 访问位；写访问还要置脏位。
///
/// 返回是否在 TLB 中找到了该 VPN（找不到时调用方改写倒排页表）。
pub(crate) fn update_entry(vpn: Vpn, is_write: bool) -> bool {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        let mut entry = ops.read_tlb_entry(slot);
        if entry.valid && entry.vpn == vpn {
            entry.used = true;
            entry.dirty |= is_write;
            ops.write_tlb_entry(slot, entry);
            return true;
        }
    }
    false
}

/// 把当前进程全部有效 TLB 槽位的访问位/脏位写回倒排页表
/// （槽位保持有效）。
fn sync_tlb_bits(pid: Pid) {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        let entry = ops.read_tlb_entry(slot);
        if entry.valid {
            write_slot_back_entry(&entry, pid);
        }
    }
}

/// 上下文切换：把上一个进程的有效 TLB 条目写回倒排页表，
/// 然后全部失效。
pub(crate) fn flush_for_switch(prev_pid: Option<Pid>) {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        let entry = ops.read_tlb_entry(slot);
        if entry.valid {
            let prev = prev_pid.expect("valid TLB entries with no previous process");
            write_slot_back_entry(&entry, prev);
        }
        ops.write_tlb_entry(slot, TranslationEntry::invalid());
    }
}

/// 不写回地失效整个 TLB（进程退出路径：条目即将整体移除）。
pub(crate) fn invalidate_all_slots() {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        ops.write_tlb_entry(slot, TranslationEntry::invalid());
    }
}

/// 失效缓存指定 VPN 的槽位（条目已从倒排页表移除，不写回）。
fn invalidate_slot_for(vpn: Vpn) {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        let entry = ops.read_tlb_entry(slot);
        if entry.valid && entry.vpn == vpn {
            ops.write_tlb_entry(slot, TranslationEntry::invalid());
        }
    }
}

/// 选受害槽位：第一个无效槽优先，否则均匀随机。
fn find_slot_to_evict() -> usize {
    let ops = machine_ops();
    for slot in 0..ops.tlb_size() {
        if !ops.read_tlb_entry(slot).valid {
            return slot;
        }
    }
    random_slot(ops.tlb_size())
}

/// 把受害槽的访问位/脏位写回倒排页表。
///
/// 有效 TLB 条目必有对应的倒排条目（不变式），缺失即断言失败。
fn write_slot_back(slot: usize, pid: Pid) {
    let entry = machine_ops().read_tlb_entry(slot);
    if entry.valid {
        write_slot_back_entry(&entry, pid);
    }
}

fn write_slot_back_entry(entry: &TranslationEntry, pid: Pid) {
    let updated = INVERTED_TABLE.lock().write_back(
        PageKey::new(entry.vpn, pid),
        entry.used,
        entry.dirty,
    );
    assert!(updated, "TLB has an entry, inverted table doesn't");
}

/// xorshift64 伪随机数：给全满 TLB 挑受害槽。
///
/// 种子任意非零即可；只要求分布大致均匀，不要求不可预测。
static RANDOM_STATE: AtomicU64 = AtomicU64::new(0x9E3779B97F4A7C15);

fn random_slot(bound: usize) -> usize {
    let mut x = RANDOM_STATE.load(Ordering::Relaxed);
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    RANDOM_STATE.store(x, Ordering::Relaxed);
    (x % bound as u64) as usize
}
