//! 进程生命周期测试（常驻变体）

use super::{install_program, load_process, spawn};
use crate::kernel::syscall::{SYSCALL_EXEC, SYSCALL_EXIT};
use crate::kernel::{alive_processes, current_process};
use crate::machine::thread::ThreadId;
use alloc::boxed::Box;
use alloc::sync::Arc;
use sync::SpinLock;
use crate::test_util::{push_program, user_syscall};
use test_support::MOCK_MACHINE;

#[test]
fn test_pids_monotonic_and_root_election() {
    let _g = crate::test_util::setup(32);

    let first = super::Process::new_user_process();
    let second = super::Process::new_user_process();
    let third = super::Process::new_user_process();

    assert_eq!(first.pid(), 1);
    assert_eq!(second.pid(), 2);
    assert_eq!(third.pid(), 3);

    // 第一个创建的进程当选根进程，且全局唯一
    assert!(first.is_root());
    assert!(!second.is_root());
    assert!(!third.is_root());
}

#[test]
fn test_execute_failure_changes_nothing() {
    let _g = crate::test_util::setup(32);

    let proc = super::Process::new_user_process();
    assert!(!proc.execute(b"nope.coff", &[]));

    assert_eq!(alive_processes(), 0);
    let inner = proc.inner.lock();
    assert!(inner.parent_kthread.is_none());
    assert!(!inner.is_finished);
}

#[test]
fn test_children_disowned_when_parent_dies() {
    let _g = crate::test_util::setup(64);
    install_program("root.coff", 1);
    install_program("child.coff", 1);

    let child_pid: Arc<SpinLock<Option<u32>>> = Arc::new(SpinLock::new(None));
    let child_pid_in_body = Arc::clone(&child_pid);

    push_program(Box::new(move || {
        let me = current_process().unwrap();
        assert_eq!(me.write_to_user(mm::Vaddr(2 * super::PAGE), b"child.coff\0"), 11);
        let pid = user_syscall(SYSCALL_EXEC, (2 * super::PAGE) as u32, 0, 0);
        assert!(pid > 0);
        *child_pid_in_body.lock() = Some(pid as u32);

        // 父进程先走一步；子进程仍在运行
        user_syscall(SYSCALL_EXIT, 0, 0, 0);
        unreachable!();
    }));
    // 子进程体：不退出，线程跑完后进程保持存活
    push_program(Box::new(|| {}));

    let root = spawn("root.coff", &[]);

    let child_pid = child_pid.lock().expect("exec must have run");
    let child = root.find_child(child_pid).expect("children list survives exit");

    // 断绝关系发生在父进程退出路径上
    assert!(child.inner.lock().parent.upgrade().is_none());
    assert!(!child.inner.lock().is_finished);
    assert_eq!(alive_processes(), 1);
}

#[test]
fn test_restore_state_points_processor_at_page_table() {
    let _g = crate::test_util::setup(32);
    install_program("prog.coff", 1);
    let proc = load_process("prog.coff", &[]);

    crate::kernel::switch_to(&proc);

    let loaded = MOCK_MACHINE.loaded_page_table();
    assert_eq!(loaded.len(), proc.num_pages());
    assert!(loaded.iter().all(|entry| entry.valid));
}

#[test]
fn test_parent_kthread_recorded() {
    let _g = crate::test_util::setup(32);
    install_program("prog.coff", 1);
    let proc = spawn("prog.coff", &[]);

    // execute 把调用线程记为唤醒目标（这里是引导线程）
    assert_eq!(proc.inner.lock().parent_kthread, Some(ThreadId(1)));
}
