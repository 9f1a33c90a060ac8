//! 用户内存拷贝引擎
//!
//! 在用户虚拟地址区间和内核缓冲区之间逐页安全搬运字节。
//! 坏地址是**数据**而不是控制流：任何非法区间都以 `-1` 返回，
//! 绝不让内核崩溃。
//!
//! 每个页片的处理顺序固定：界检 VPN → 解析 VPN→PPN（按需调页
//! 变体可能就此把页缺进来）→ 搬运 → 更新访问位（写操作还置
//! 脏位）。写操作在搬运前多做一次只读检查。

use crate::kernel::{self, process::Process};
use alloc::vec;
use alloc::vec::Vec;
use kdebug::kdebug;
use mm::{PageNum, UsizeConvert, Vaddr, Vpn, machine_ops, mm_config};

impl Process {
    /// 从本进程的虚拟内存读取 `dst.len()` 个字节。
    ///
    /// 返回成功搬运的字节数；区间碰到越界、缺失或无效的翻译时
    /// 返回 `-1`（此前已搬运进 `dst` 低位的字节保持原样）。
    pub fn read_from_user(&self, vaddr: Vaddr, dst: &mut [u8]) -> isize {
        let page_size = mm_config().page_size();
        let is_current = kernel::current_pid() == Some(self.pid());

        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let mut read_so_far = 0usize;
        let mut va = vaddr.as_usize();
        let end = va + dst.len();

        while va < end {
            let vpn = Vpn(va / page_size);
            if !inner.space.check_valid_vpn(vpn, inner.num_pages) {
                kdebug!('v', "read from invalid vpn {}", vpn.as_usize());
                return -1;
            }

            let offset = va % page_size;
            let amount = (end - va).min(page_size - offset);

            let entry = match inner.space.translate_vpn(
                vpn,
                self.pid(),
                is_current,
                inner.coff.as_deref(),
            ) {
                Ok(entry) => entry,
                Err(_) => return -1,
            };
            debug_assert!(entry.valid);

            machine_ops().read_phys(
                entry.ppn.addr_with_offset(offset),
                &mut dst[read_so_far..read_so_far + amount],
            );
            inner.space.update_access_bits(vpn, self.pid(), is_current, false);

            va += amount;
            read_so_far += amount;
        }

        read_so_far as isize
    }

    /// 把 `src` 写入本进程的虚拟内存。
    ///
    /// 返回成功搬运的字节数；除读取路径的全部失败情形外，
    /// 目标页只读时也返回 `-1`，且不会向该页写入任何字节。
    pub fn write_to_user(&self, vaddr: Vaddr, src: &[u8]) -> isize {
        let page_size = mm_config().page_size();
        let is_current = kernel::current_pid() == Some(self.pid());

        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let mut written = 0usize;
        let mut va = vaddr.as_usize();
        let end = va + src.len();

        while va < end {
            let vpn = Vpn(va / page_size);
            if !inner.space.check_valid_vpn(vpn, inner.num_pages) {
                kdebug!('v', "write to invalid vpn {}", vpn.as_usize());
                return -1;
            }

            let offset = va % page_size;
            let amount = (end - va).min(page_size - offset);

            let entry = match inner.space.translate_vpn(
                vpn,
                self.pid(),
                is_current,
                inner.coff.as_deref(),
            ) {
                Ok(entry) => entry,
                Err(_) => return -1,
            };
            debug_assert!(entry.valid);
            if entry.read_only {
                return -1;
            }

            machine_ops().write_phys(
                entry.ppn.addr_with_offset(offset),
                &src[written..written + amount],
            );
            inner.space.update_access_bits(vpn, self.pid(), is_current, true);

            va += amount;
            written += amount;
        }

        written as isize
    }

    /// 读取一个以 0 结尾的用户字符串，最多 `max_len` 个字节
    /// （不含终止符）。
    ///
    /// 在读到的前缀里找不到终止符、或区间非法时返回 `None`。
    /// 返回的是原始字节：文件名等内容按不透明字节串对待，
    /// 编码由调用者决定。
    pub fn read_cstring(&self, vaddr: Vaddr, max_len: usize) -> Option<Vec<u8>> {
        let mut bytes = vec![0u8; max_len + 1];

        let bytes_read = self.read_from_user(vaddr, &mut bytes);
        kdebug!('v', "read_cstring: {} bytes at {:#x}", bytes_read, vaddr.as_usize());
        if bytes_read < 0 {
            return None;
        }

        bytes[..bytes_read as usize]
            .iter()
            .position(|&b| b == 0)
            .map(|len| {
                bytes.truncate(len);
                bytes
            })
    }
}
