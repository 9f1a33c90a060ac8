//! 用户态异常入口
//!
//! 模拟处理器在用户态发生异常时把控制权交到这里。三条路：
//!
//! - 系统调用 → 分发器（返回值写回 v0，PC 前进一条指令）
//! - TLB 缺失（仅按需调页变体）→ 软件重填
//! - 其余一切 → 用户程序的非法行为：记录日志并击杀进程，
//!   内核存活
//!
//! TLB 缺失处理全程关中断——TLB 是寄存器可见的共享资源。

use crate::kernel;
use crate::kernel::syscall;
use crate::machine::processor::{ExceptionCause, processor_ops, reg};
use crate::mm::tlb;
use kdebug::kdebug;
use mm::Vaddr;
use sync::IntrGuard;

/// 处理一次用户态异常。
///
/// 由嵌入方的异常分发器调用；调用时当前进程必须已经由
/// [`kernel::switch_to`] 登记。
pub fn handle_exception(cause: ExceptionCause) {
    let proc = kernel::current_process().expect("user exception with no current process");
    let ops = processor_ops();

    match cause {
        ExceptionCause::Syscall => {
            let result = syscall::handle_syscall(
                &proc,
                ops.read_register(reg::V0),
                ops.read_register(reg::A0),
                ops.read_register(reg::A1),
                ops.read_register(reg::A2),
                ops.read_register(reg::A3),
            );
            ops.write_register(reg::V0, result as u32);
            ops.advance_pc();
        }

        ExceptionCause::TlbMiss if proc.is_demand_paged() => {
            let _guard = IntrGuard::new();
            let bad_vaddr = Vaddr::from_user(ops.read_register(reg::BAD_VADDR));
            if !tlb::handle_tlb_miss(&proc, bad_vaddr) {
                kdebug!(
                    'a',
                    "process {}: TLB miss outside address space ({:#x})",
                    proc.pid(),
                    ops.read_register(reg::BAD_VADDR)
                );
                proc.kill_process(2, false);
            }
        }

        _ => {
            kdebug!(
                'a',
                "process {}: unexpected exception: {} (bad vaddr {:#x})",
                proc.pid(),
                cause.name(),
                ops.read_register(reg::BAD_VADDR)
            );
            proc.kill_process(2, false);
        }
    }
}
