//! 进程核心的宿主机测试
//!
//! 全部用例跑在 test-support 的 mock 机器上：常驻变体、
//! eager 调度（fork 即运行）为默认；个别用例切到 deferred
//! 模式测试睡眠路径。

use alloc::sync::Arc;
use alloc::vec::Vec;
use test_support::{MOCK_EXEC_FS, MockProgram};

use crate::kernel::process::Process;

mod lifecycle;

/// mock 机器的页大小
pub(crate) const PAGE: usize = test_support::PAGE_SIZE;

/// 安装一个单段可写映像。
pub(crate) fn install_program(name: &str, pages: usize) {
    MOCK_EXEC_FS.install(name, MockProgram::simple(pages, 0x40));
}

/// 创建进程并只加载映像（不 fork 用户线程）。
pub(crate) fn load_process(name: &str, args: &[&[u8]]) -> Arc<Process> {
    let proc = Process::new_user_process();
    let args: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
    assert!(proc.load(name.as_bytes(), &args));
    proc
}

/// 创建进程并 execute（eager 模式下用户线程立即跑完）。
pub(crate) fn spawn(name: &str, args: &[&[u8]]) -> Arc<Process> {
    let proc = Process::new_user_process();
    let args: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
    assert!(proc.execute(name.as_bytes(), &args));
    proc
}
