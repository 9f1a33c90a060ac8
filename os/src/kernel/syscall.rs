//! 系统调用分发与处理
//!
//! 用户程序把调用号放在 v0、参数放在 a0..a3 后陷入内核。
//! 分发器调用对应的处理函数，把返回值写回 v0 并前进 PC；
//! `exit` 不返回（用户线程在控制权回来之前已经结束）。
//!
//! ABI 调用号表固定如下；`creat/open/close/unlink` 存在于 ABI
//! 但本核心不实现，与未知调用号同样对调用者致命（内核存活）。
//!
//! | # | 原型 |
//! |---|------|
//! | 0 | `void halt()` |
//! | 1 | `void exit(int)` |
//! | 2 | `int exec(char*, int, char**)` |
//! | 3 | `int join(int, int*)` |
//! | 6 | `int read(int, char*, int)` |
//! | 7 | `int write(int, char*, int)` |

use crate::kernel::process::Process;
use crate::machine::processor::processor_ops;
use crate::machine::thread::sched_ops;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use kdebug::kdebug;
use mm::Vaddr;
use sync::IntrGuard;

pub(crate) const SYSCALL_HALT: u32 = 0;
pub(crate) const SYSCALL_EXIT: u32 = 1;
pub(crate) const SYSCALL_EXEC: u32 = 2;
pub(crate) const SYSCALL_JOIN: u32 = 3;
pub(crate) const SYSCALL_CREATE: u32 = 4;
pub(crate) const SYSCALL_OPEN: u32 = 5;
pub(crate) const SYSCALL_READ: u32 = 6;
pub(crate) const SYSCALL_WRITE: u32 = 7;
pub(crate) const SYSCALL_CLOSE: u32 = 8;
pub(crate) const SYSCALL_UNLINK: u32 = 9;

/// 系统调用涉及的 C 字符串（文件名、参数）的长度上限
pub(crate) const MAX_SYSCALL_STRING: usize = 256;

/// 分发一次系统调用，返回要写回 v0 的值。
pub(crate) fn handle_syscall(
    proc: &Arc<Process>,
    syscall: u32,
    a0: u32,
    a1: u32,
    a2: u32,
    _a3: u32,
) -> i32 {
    match syscall {
        SYSCALL_HALT => handle_halt(proc),
        SYSCALL_EXIT => handle_exit(proc, a0 as i32),
        SYSCALL_EXEC => handle_exec(proc, a0, a1 as i32, a2),
        SYSCALL_JOIN => handle_join(proc, a0 as i32, a1),
        SYSCALL_READ => handle_read(proc, a0 as i32, a1, a2 as i32),
        SYSCALL_WRITE => handle_write(proc, a0 as i32, a1, a2 as i32),
        SYSCALL_CREATE | SYSCALL_OPEN | SYSCALL_CLOSE | SYSCALL_UNLINK => {
            // ABI 里存在但本核心不实现
            kdebug!('a', "unimplemented syscall {}", syscall);
            proc.kill_process(2, false)
        }
        _ => {
            kdebug!('a', "unknown syscall {}", syscall);
            proc.kill_process(2, false)
        }
    }
}

/// halt：只许根进程停机；其余进程得到返回值 1，机器照常运行。
fn handle_halt(proc: &Arc<Process>) -> i32 {
    if !proc.is_root() {
        return 1;
    }

    processor_ops().halt()
}

/// exit：标记正常退出并走统一销毁路径；不返回。
fn handle_exit(proc: &Arc<Process>, status: i32) -> ! {
    proc.kill_process(status, true)
}

/// exec：加载 `nameVaddr` 处的程序为子进程。
///
/// 文件名最多 256 字节且必须以 `.coff` 结尾；`argc` 个参数指针
/// 从 `argvVaddr` 起按 4 字节小端读取，参数串缺终止符时以空串
/// 代替。成功返回子进程号，任何失败返回 -1。
fn handle_exec(proc: &Arc<Process>, name_vaddr: u32, argc: i32, argv_vaddr: u32) -> i32 {
    kdebug!('a', "exec in process {}", proc.pid());

    let Some(name) = proc.read_cstring(Vaddr::from_user(name_vaddr), MAX_SYSCALL_STRING) else {
        return -1;
    };
    if !name.ends_with(b".coff") {
        return -1;
    }
    if argc < 0 {
        return -1;
    }

    let mut args: Vec<Vec<u8>> = Vec::with_capacity(argc as usize);
    let mut argv_vaddr = argv_vaddr;
    for i in 0..argc as usize {
        let mut pointer_bytes = [0u8; 4];
        let _ = proc.read_from_user(Vaddr::from_user(argv_vaddr), &mut pointer_bytes);

        let pointer = u32::from_le_bytes(pointer_bytes);
        let arg = proc
            .read_cstring(Vaddr::from_user(pointer), MAX_SYSCALL_STRING)
            .unwrap_or_default();
        kdebug!('v', "process {} argv{} at {:#x}", proc.pid(), i, pointer);
        args.push(arg);

        argv_vaddr = argv_vaddr.wrapping_add(4);
    }

    let child = Process::new_user_process();
    if !child.execute(&name, &args) {
        return -1;
    }

    // 锁序固定为父先子后
    let mut inner = proc.inner.lock();
    child.inner.lock().parent = Arc::downgrade(proc);
    let child_pid = child.pid() as i32;
    inner.children.push(child);
    child_pid
}

/// join：等待直接子进程退出并取回其退出状态。
///
/// 返回 1（正常退出）、0（被内核击杀）或 -1（不是自己的子进程）。
fn handle_join(proc: &Arc<Process>, child_pid: i32, status_vaddr: u32) -> i32 {
    // "检查子进程状态—登记 joined—睡眠"必须对子进程的退出原子
    let _guard = IntrGuard::new();

    kdebug!('a', "process {} joining {}", proc.pid(), child_pid);

    if child_pid < 0 {
        return -1;
    }
    let Some(child) = proc.find_child(child_pid as u32) else {
        return -1;
    };

    let must_sleep = {
        let mut child_inner = child.inner.lock();
        if !child_inner.is_finished {
            child_inner.joined = true;
            true
        } else {
            false
        }
    };
    if must_sleep {
        sched_ops().sleep_current();
    }

    let (exit_status, normally_exited) = {
        let child_inner = child.inner.lock();
        assert!(child_inner.is_finished, "Joined process is not finished");
        (child_inner.exit_status, child_inner.normally_exited)
    };

    // 状态字写失败不影响返回值
    let _ = proc.write_to_user(Vaddr::from_user(status_vaddr), &exit_status.to_le_bytes());

    // 断绝关系：join 过的子进程从列表中移除
    proc.inner
        .lock()
        .children
        .retain(|c| c.pid() != child.pid());

    if normally_exited { 1 } else { 0 }
}

/// read：只支持 fd 0（控制台输入）。
///
/// 阻塞读取最多 `count` 个字节，然后写入用户缓冲区；返回真正
/// 落进用户内存的字节数（坏指针导致的短写也如实返回）。
fn handle_read(proc: &Arc<Process>, fd: i32, buf_vaddr: u32, count: i32) -> i32 {
    if fd != 0 {
        return -1;
    }
    if !proc.vaddr_in_range(Vaddr::from_user(buf_vaddr)) {
        return -1;
    }
    if count < 0 {
        return -1;
    }

    let Some(stdin) = proc.stdin() else {
        return -1;
    };

    let mut data = vec![0u8; count as usize];
    let received = stdin.read(&mut data);

    proc.write_to_user(Vaddr::from_user(buf_vaddr), &data[..received]) as i32
}

/// write：只支持 fd 1（控制台输出）。
///
/// 读出用户缓冲区并转发到控制台。成功固定返回 0 ——这是既有
/// 用户程序依赖的 ABI 行为；坏指针返回 -1。
fn handle_write(proc: &Arc<Process>, fd: i32, buf_vaddr: u32, count: i32) -> i32 {
    if fd != 1 {
        return -1;
    }
    if !proc.vaddr_in_range(Vaddr::from_user(buf_vaddr)) {
        return -1;
    }
    if count < 0 {
        return -1;
    }

    let Some(stdout) = proc.stdout() else {
        return -1;
    };

    let mut data = vec![0u8; count as usize];
    let length = proc.read_from_user(Vaddr::from_user(buf_vaddr), &mut data);
    if length < 0 {
        return -1;
    }

    stdout.write(&data[..length as usize]);
    0
}
