//! COFF 映像加载器
//!
//! 把一个可执行文件变成可运行的地址空间：
//!
//! 1. 打开并解析 COFF；段必须从 VPN 0 开始连续排布
//! 2. 参数块（指针数组 + 字符串）必须放得进一页
//! 3. 版图按序固定：代码/数据段 → 8 页栈 → 1 页参数
//! 4. 由地址空间变体加载各段（常驻变体在此一次性分配全部帧）
//! 5. 把 argv 写进最后一页，记录初始 PC/SP
//!
//! 任何一步失败都不泄漏帧：帧的所有权在 RAII 跟踪器里，
//! 失败路径随页表一起丢弃。

use crate::kernel::process::Process;
use alloc::string::String;
use alloc::vec::Vec;
use kdebug::kdebug;
use mm::{UsizeConvert, Vaddr, mm_config};
use sync::IntrGuard;

use crate::machine::coff::exec_ops;

/// 用户栈的固定页数
pub(crate) const STACK_PAGES: usize = 8;

impl Process {
    /// 加载可执行文件并准备参数，成功后进程即可运行。
    pub(crate) fn load(&self, name: &[u8], args: &[Vec<u8>]) -> bool {
        kdebug!('a', "load(\"{}\")", String::from_utf8_lossy(name));
        for (i, arg) in args.iter().enumerate() {
            kdebug!('v', "args{} = \"{}\"", i, String::from_utf8_lossy(arg));
        }

        let Some(coff) = exec_ops().open_executable(name) else {
            kdebug!('a', "\topen failed");
            return false;
        };

        // 段必须连续且从页 0 开始
        let mut num_pages = 0usize;
        for s in 0..coff.num_sections() {
            let section = coff.section(s);
            if section.first_vpn != num_pages {
                kdebug!('a', "\tfragmented executable");
                return false;
            }
            num_pages += section.length;
        }

        // 参数块必须放得进一页：每个参数 4 字节指针 + 字符串 + 终止符
        let page_size = mm_config().page_size();
        let args_size: usize = args.iter().map(|arg| 4 + arg.len() + 1).sum();
        if args_size > page_size {
            kdebug!('a', "\targuments too long");
            return false;
        }

        // PC 指向程序入口点
        let initial_pc = coff.entry_point();

        // 接着是栈；栈指针指向栈顶（越过最后一个栈字节）
        num_pages += STACK_PAGES;
        let initial_sp = (num_pages * page_size) as u32;

        // 最后保留 1 页放参数
        num_pages += 1;

        {
            let mut inner = self.inner.lock();
            inner.coff = Some(coff);
            inner.num_pages = num_pages;
            inner.initial_pc = initial_pc;
            inner.initial_sp = initial_sp;
        }

        if !self.load_sections() {
            return false;
        }

        // 把参数存进最后一页
        self.load_cmd_args(args);

        true
    }

    /// 由地址空间变体加载各段。
    ///
    /// 常驻变体在关中断状态下检查空闲帧是否足额、一次性分配并
    /// 拷入段内容；按需调页变体此时不分配任何帧。
    fn load_sections(&self) -> bool {
        let _guard = IntrGuard::new();
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let coff = inner.coff.as_deref().expect("load_sections before open");
        inner.space.load_sections(self.pid(), coff, inner.num_pages)
    }

    /// 把 argv 写进最后一页。
    ///
    /// 版式：页首是 argc 个 32 位小端指针，紧随其后是各参数
    /// 字符串背靠背排列、各自以 0 结尾；指针值是对应字符串的
    /// 用户虚拟地址。
    fn load_cmd_args(&self, args: &[Vec<u8>]) {
        let page_size = mm_config().page_size();

        let (num_pages, pid) = {
            let mut inner = self.inner.lock();
            inner.argc = args.len();
            inner.argv_addr = (inner.num_pages - 1) * page_size;
            (inner.num_pages, self.pid())
        };

        let mut entry_offset = (num_pages - 1) * page_size;
        let mut string_offset = entry_offset + args.len() * 4;

        for arg in args {
            let pointer = (string_offset as u32).to_le_bytes();
            assert_eq!(
                self.write_to_user(Vaddr::from_usize(entry_offset), &pointer),
                4
            );
            entry_offset += 4;

            assert_eq!(
                self.write_to_user(Vaddr::from_usize(string_offset), arg),
                arg.len() as isize
            );
            string_offset += arg.len();

            assert_eq!(self.write_to_user(Vaddr::from_usize(string_offset), &[0]), 1);
            string_offset += 1;
        }

        kdebug!('a', "process {} argv at {:#x}, {} args", pid, (num_pages - 1) * page_size, args.len());
    }
}
