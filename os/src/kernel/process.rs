//! 进程控制块与生命周期
//!
//! 一个进程 = 一个 COFF 映像 + 一个地址空间 + 父子链接 + 标准
//! 流 + 退出状态。线程不属于进程状态：用户线程由调度器接口
//! fork，进程只记下要在退出时唤醒的父线程句柄。
//!
//! 父子图的所有权是单向的：父进程对子进程持强引用（join 成功后
//! 放弃），子进程对父进程只持弱引用（父进程死亡时清空）。
//! 这既避免了引用环，也保留了"断绝关系"的语义。

use crate::kernel::{self, KERNEL};
use crate::machine::coff::CoffImage;
use crate::machine::console::{Stream, console_ops};
use crate::machine::processor::{NUM_USER_REGISTERS, processor_ops, reg};
use crate::machine::thread::{ThreadId, sched_ops};
use crate::mm::AddressSpace;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use kdebug::kdebug;
use mm::frame_allocator::free_frames;
use mm::page_table::PageTable;
use mm::{Pid, UsizeConvert, Vaddr};
use sync::{IntrGuard, SpinLock};

/// 进程控制块
///
/// pid 在构造时分配且不变；其余状态在内部锁的保护下修改。
pub struct Process {
    pid: Pid,
    pub(crate) inner: SpinLock<ProcessInner>,
}

/// 进程的可变状态
pub(crate) struct ProcessInner {
    /// 地址空间（常驻页表或按需调页）
    pub space: AddressSpace,
    /// 正在运行的可执行映像，持有到进程退出
    pub coff: Option<Box<dyn CoffImage>>,
    /// 地址空间总页数：代码/数据段 + 栈页 + 参数页
    pub num_pages: usize,
    /// 参数个数
    pub argc: usize,
    /// 参数指针数组在用户空间的地址（最后一页的开头）
    pub argv_addr: usize,
    /// 初始 PC（程序入口点）
    pub initial_pc: u32,
    /// 初始栈指针（栈顶，越过最后一个栈字节）
    pub initial_sp: u32,
    /// 父进程的弱引用；父进程死亡时清空
    pub parent: Weak<Process>,
    /// 子进程的强引用；join 成功后移除
    pub children: Vec<Arc<Process>>,
    /// 控制台输入流（fd 0）
    pub stdin: Option<Arc<dyn Stream>>,
    /// 控制台输出流（fd 1）
    pub stdout: Option<Arc<dyn Stream>>,
    /// 进程是否已完成销毁
    pub is_finished: bool,
    /// 退出状态（exit 的参数，或内核击杀时的状态码）
    pub exit_status: i32,
    /// 是否经由 exit 正常退出（否则是被内核击杀）
    pub normally_exited: bool,
    /// 父进程是否正在 join 本进程
    pub joined: bool,
    /// 调用 execute 的线程；joined 时退出路径唤醒它
    pub parent_kthread: Option<ThreadId>,
}

impl Process {
    /// 创建一个新的用户进程。
    ///
    /// 在关中断状态下分配 pid 并竞选根进程；打开标准流。
    /// 地址空间变体由内核上下文的调页开关决定。
    pub fn new_user_process() -> Arc<Process> {
        let _guard = IntrGuard::new();

        let (pid, is_root) = kernel::allocate_pid();
        let demand_paging = KERNEL.lock().demand_paging;
        kdebug!('a', "process {} created{}", pid, if is_root { " (root)" } else { "" });

        let space = if demand_paging {
            AddressSpace::DemandPaged
        } else {
            AddressSpace::Resident {
                table: PageTable::empty(),
            }
        };

        let console = console_ops();
        Arc::new(Process {
            pid,
            inner: SpinLock::new(ProcessInner {
                space,
                coff: None,
                num_pages: 0,
                argc: 0,
                argv_addr: 0,
                initial_pc: 0,
                initial_sp: 0,
                parent: Weak::new(),
                children: Vec::new(),
                stdin: Some(console.open_stdin()),
                stdout: Some(console.open_stdout()),
                is_finished: false,
                exit_status: 0,
                normally_exited: false,
                joined: false,
                parent_kthread: None,
            }),
        })
    }

    /// 进程号。
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 本进程是否是根进程。
    pub fn is_root(&self) -> bool {
        KERNEL.lock().root_pid == Some(self.pid)
    }

    /// 地址空间是否是按需调页变体。
    pub fn is_demand_paged(&self) -> bool {
        matches!(self.inner.lock().space, AddressSpace::DemandPaged)
    }

    /// 地址空间总页数。
    pub fn num_pages(&self) -> usize {
        self.inner.lock().num_pages
    }

    /// 取一份标准输入流的引用（不持有内部锁做阻塞读）。
    pub(crate) fn stdin(&self) -> Option<Arc<dyn Stream>> {
        self.inner.lock().stdin.clone()
    }

    /// 取一份标准输出流的引用。
    pub(crate) fn stdout(&self) -> Option<Arc<dyn Stream>> {
        self.inner.lock().stdout.clone()
    }

    /// 加载指定程序并 fork 一个用户线程运行它。
    ///
    /// 成功时记下调用线程（join 的唤醒目标）、递增存活计数、
    /// fork 用户线程；三者对"子进程开始运行"原子。
    pub fn execute(self: &Arc<Self>, name: &[u8], args: &[Vec<u8>]) -> bool {
        if !self.load(name, args) {
            return false;
        }

        let _guard = IntrGuard::new();
        self.inner.lock().parent_kthread = Some(sched_ops().current_thread());
        KERNEL.lock().alive += 1;

        let proc = Arc::clone(self);
        let thread_name = String::from_utf8_lossy(name).into_owned();
        sched_ops().fork(
            &thread_name,
            Box::new(move || {
                kernel::switch_to(&proc);
                proc.init_registers();
                processor_ops().run();
            }),
        );

        true
    }

    /// 上下文切换进本进程后恢复地址空间状态。
    pub(crate) fn restore_state(&self, prev_pid: Option<Pid>) {
        let inner = self.inner.lock();
        inner.space.restore_state(prev_pid);
    }

    /// 进程销毁的唯一路径。
    ///
    /// exit 系统调用、非法行为击杀和未知系统调用都汇聚到这里。
    /// 完成后结束当前线程，因此不返回；若这是最后一个存活进程，
    /// 则终止整个内核。
    pub fn kill_process(self: &Arc<Self>, status: i32, normally_exited: bool) -> ! {
        let _guard = IntrGuard::new();

        // 子进程可能比本进程活得久：先断开它们的父链接
        {
            let inner = self.inner.lock();
            for child in &inner.children {
                child.inner.lock().parent = Weak::new();
            }
        }

        kdebug!('a', "before killing process {} pool had {} pages", self.pid, free_frames());

        let wake_target = {
            let mut inner = self.inner.lock();
            inner.is_finished = true;
            inner.exit_status = status;
            inner.normally_exited = normally_exited;

            if let Some(stdin) = inner.stdin.take() {
                stdin.close();
            }
            if let Some(stdout) = inner.stdout.take() {
                stdout.close();
            }
            // 可执行映像持有到退出为止，Drop 关闭底层文件
            inner.coff = None;

            let inner = &mut *inner;
            let released = inner.space.unload_sections(self.pid);
            kdebug!('a', "process {} released {} pages", self.pid, released);

            if inner.joined { inner.parent_kthread } else { None }
        };

        if let Some(thread) = wake_target {
            sched_ops().ready(thread);
        }

        let last_one = kernel::note_process_exit();

        kdebug!('a', "process {} exiting with status {}", self.pid, status);
        kdebug!('a', "after killing process {} pool had {} pages", self.pid, free_frames());

        if last_one {
            kernel::terminate();
        }
        sched_ops().finish_current()
    }

    /// 为运行本进程初始化处理器寄存器。
    ///
    /// 全部用户寄存器清零，然后设置 PC、SP，以及 A0 ← argc、
    /// A1 ← argv。
    pub fn init_registers(&self) {
        let ops = processor_ops();

        // 默认一切为 0
        for r in 0..NUM_USER_REGISTERS {
            ops.write_register(r, 0);
        }

        let inner = self.inner.lock();
        ops.write_register(reg::PC, inner.initial_pc);
        ops.write_register(reg::SP, inner.initial_sp);
        ops.write_register(reg::A0, inner.argc as u32);
        ops.write_register(reg::A1, inner.argv_addr as u32);
    }

    /// 在子进程列表中查找 pid。
    pub(crate) fn find_child(&self, pid: Pid) -> Option<Arc<Process>> {
        self.inner
            .lock()
            .children
            .iter()
            .find(|child| child.pid() == pid)
            .cloned()
    }

    /// 检查一个虚拟地址是否落在本进程的地址空间内。
    pub(crate) fn vaddr_in_range(&self, vaddr: Vaddr) -> bool {
        vaddr.as_usize() < self.num_pages() * mm::mm_config().page_size()
    }
}
