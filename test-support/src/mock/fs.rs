//! 可执行文件存储的原始 Mock
//!
//! 测试先 `install` 一个按名字索引的假 COFF 映像（若干段，
//! 每段整页的字节内容）。消费方在自己的 `cfg(test)` 代码里
//! 把查到的 [`MockProgram`] 包装成它的映像接口。
//!
//! 段的首 VPN 默认按安装顺序连续计算；要制造"碎片化可执行
//! 文件"时用 `first_vpn_override`。

use crate::mock::machine::PAGE_SIZE;
use std::sync::Mutex;

/// 一个假 COFF 段
#[derive(Clone)]
pub struct MockSection {
    /// 段名（诊断用）
    pub name: String,
    /// 只读段
    pub read_only: bool,
    /// 整页的段内容；页数 = data.len() / PAGE_SIZE
    pub data: Vec<u8>,
    /// 覆盖默认的连续首 VPN（制造碎片化映像）
    pub first_vpn_override: Option<usize>,
}

impl MockSection {
    /// 一个 `pages` 页的段，内容以 `fill` 为基调按字节序号扰动。
    pub fn filled(name: &str, pages: usize, fill: u8, read_only: bool) -> Self {
        let data = (0..pages * PAGE_SIZE)
            .map(|i| fill.wrapping_add((i % 251) as u8))
            .collect();
        MockSection {
            name: name.into(),
            read_only,
            data,
            first_vpn_override: None,
        }
    }
}

/// 一个假 COFF 映像
#[derive(Clone)]
pub struct MockProgram {
    /// 程序入口点
    pub entry_point: u32,
    /// 各段，按 VPN 顺序
    pub sections: Vec<MockSection>,
}

impl MockProgram {
    /// 单个可写段的最小映像。
    pub fn simple(pages: usize, entry_point: u32) -> Self {
        MockProgram {
            entry_point,
            sections: vec![MockSection::filled(".text", pages, 0x10, false)],
        }
    }

    /// 第 `index` 个段的首 VPN（默认连续排布）。
    pub fn first_vpn(&self, index: usize) -> usize {
        if let Some(first_vpn) = self.sections[index].first_vpn_override {
            return first_vpn;
        }
        self.sections[..index]
            .iter()
            .map(|section| section.data.len() / PAGE_SIZE)
            .sum()
    }
}

/// Mock 可执行文件存储
pub struct MockExecFs {
    files: Mutex<Vec<(Vec<u8>, MockProgram)>>,
}

impl MockExecFs {
    const fn new() -> Self {
        MockExecFs {
            files: Mutex::new(Vec::new()),
        }
    }

    /// 清空存储。
    pub fn clear(&self) {
        self.files.lock().unwrap().clear();
    }

    /// 安装（或替换）一个映像。
    pub fn install(&self, name: &str, program: MockProgram) {
        let mut files = self.files.lock().unwrap();
        files.retain(|(n, _)| n != name.as_bytes());
        files.push((name.as_bytes().to_vec(), program));
    }

    /// 按名字查找映像。
    pub fn open(&self, name: &[u8]) -> Option<MockProgram> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, program)| program.clone())
    }
}

/// 全局 Mock 可执行文件存储实例
pub static MOCK_EXEC_FS: MockExecFs = MockExecFs::new();
