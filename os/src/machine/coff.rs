//! COFF 可执行映像接口 trait 定义和注册
//!
//! COFF 的解析由外部组件完成；内核只消费解析结果：
//! 段的首 VPN、页数、只读标志，以及"把段内某页的初始化内容
//! 拷入指定物理帧"的能力。宿主文件系统同样在此抽象：
//! [`ExecOps::open_executable`] 统一了打开与解析两步，
//! 文件缺失和解析失败都表现为 `None`。

use alloc::boxed::Box;
use alloc::string::String;
use core::sync::atomic::{AtomicUsize, Ordering};
use mm::Ppn;

bitflags::bitflags! {
    /// COFF 段属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        /// 段内容不可写（.text / .rodata）
        const READ_ONLY = 1 << 0;
        /// 段在文件中带有初始化内容（非 .bss）
        const INITIALIZED = 1 << 1;
    }
}

/// 一个 COFF 段的元数据
#[derive(Debug, Clone)]
pub struct CoffSectionInfo {
    /// 段名（诊断用）
    pub name: String,
    /// 段的第一个虚拟页码
    pub first_vpn: usize,
    /// 段占用的页数
    pub length: usize,
    /// 段属性
    pub flags: SectionFlags,
}

impl CoffSectionInfo {
    /// 段是否只读。
    pub fn read_only(&self) -> bool {
        self.flags.contains(SectionFlags::READ_ONLY)
    }
}

/// 一个已打开并解析成功的 COFF 可执行映像
///
/// 映像从进程加载持有到进程退出；Drop 时关闭底层文件。
pub trait CoffImage: Send + Sync {
    /// 程序入口点
    fn entry_point(&self) -> u32;

    /// 段数量
    fn num_sections(&self) -> usize;

    /// 第 `index` 个段的元数据
    fn section(&self, index: usize) -> CoffSectionInfo;

    /// 把第 `section` 段的第 `spage` 页的初始化内容写入物理帧 `ppn`
    ///
    /// 不足一页的部分由实现补零。
    fn load_page(&self, section: usize, spage: usize, ppn: Ppn);
}

/// 可执行文件打开接口
pub trait ExecOps: Send + Sync {
    /// 按名字打开并解析一个 COFF 可执行文件
    ///
    /// 文件名是不透明字节串，编码由宿主文件系统决定。
    /// 文件不存在或解析失败时返回 `None`。
    fn open_executable(&self, name: &[u8]) -> Option<Box<dyn CoffImage>>;
}

static EXEC_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static EXEC_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册可执行文件打开接口实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_exec_ops(ops: &'static dyn ExecOps) {
    let ptr = ops as *const dyn ExecOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ExecOps, (usize, usize)>(ptr) };
    EXEC_OPS_DATA.store(data, Ordering::Release);
    EXEC_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的可执行文件打开接口实现
///
/// # Panics
/// 如果尚未调用 [`register_exec_ops`] 注册实现，则 panic
#[inline]
pub fn exec_ops() -> &'static dyn ExecOps {
    let data = EXEC_OPS_DATA.load(Ordering::Acquire);
    let vtable = EXEC_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("os: ExecOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ExecOps>((data, vtable)) }
}
