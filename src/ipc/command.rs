//! Command ids, command words and argument decoding.
//!
//! ## Command word
//! ```text
//! 31      24 23     16 15      8 7       0
//! [   id   ][ in bufs ][out bufs][ params ]
//! ```
//!
//! ## Argument words
//! Buffer descriptors come first (inputs, then outputs), two words each
//! (`ptr`, `size`), followed by the plain parameters.

use super::IpcBuffer;

pub const CMD_ID_SHIFT: u32 = 24;
pub const CMD_IN_BUFS_SHIFT: u32 = 16;
pub const CMD_OUT_BUFS_SHIFT: u32 = 8;

/// Pack a command word.
#[inline]
pub const fn make_cmd(id: u8, in_bufs: u8, out_bufs: u8, params: u8) -> u32 {
    (id as u32) << CMD_ID_SHIFT
        | (in_bufs as u32) << CMD_IN_BUFS_SHIFT
        | (out_bufs as u32) << CMD_OUT_BUFS_SHIFT
        | params as u32
}

#[inline]
pub const fn cmd_id(cmd: u32) -> u8 {
    (cmd >> CMD_ID_SHIFT) as u8
}

#[inline]
pub const fn cmd_in_bufs(cmd: u32) -> u8 {
    (cmd >> CMD_IN_BUFS_SHIFT) as u8
}

#[inline]
pub const fn cmd_out_bufs(cmd: u32) -> u8 {
    (cmd >> CMD_OUT_BUFS_SHIFT) as u8
}

#[inline]
pub const fn cmd_params(cmd: u32) -> u8 {
    cmd as u8
}

macro_rules! command_ids {
    ($($name:ident = $id:literal, ($i:literal, $o:literal, $p:literal);)*) => {
        /// Every command the companion processor may send.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum CommandId {
            $($name = $id,)*
        }

        impl CommandId {
            pub const ALL: &'static [CommandId] = &[$(CommandId::$name,)*];

            /// `(input buffers, output buffers, parameter words)`.
            pub const fn layout(self) -> (u8, u8, u8) {
                match self {
                    $(CommandId::$name => ($i, $o, $p),)*
                }
            }
        }

        impl TryFrom<u8> for CommandId {
            type Error = u8;

            fn try_from(id: u8) -> Result<Self, u8> {
                match id {
                    $($id => Ok(CommandId::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

command_ids! {
    FMount = 0, (0, 0, 1);
    FUnmount = 1, (0, 0, 1);
    FIsDriveMounted = 2, (0, 0, 1);
    FGetFree = 3, (0, 1, 1);
    FGetDevSize = 4, (0, 0, 1);
    FIsDevActive = 5, (0, 0, 1);
    FPrepRawAccess = 6, (0, 0, 1);
    FFinalRawAccess = 7, (0, 0, 1);
    FCreateDevBuf = 8, (0, 0, 1);
    FFreeDevBuf = 9, (0, 0, 1);
    FReadToDevBuf = 10, (0, 0, 4);
    FWriteFromDevBuf = 11, (0, 0, 4);
    FOpen = 12, (1, 0, 1);
    FRead = 13, (0, 1, 1);
    FWrite = 14, (1, 0, 1);
    FSync = 15, (0, 0, 1);
    FLseek = 16, (0, 0, 2);
    FTell = 17, (0, 0, 1);
    FSize = 18, (0, 0, 1);
    FClose = 19, (0, 0, 1);
    FExpand = 20, (0, 0, 2);
    FStat = 21, (1, 1, 0);
    FOpenDir = 22, (1, 0, 0);
    FReadDir = 23, (0, 1, 2);
    FCloseDir = 24, (0, 0, 1);
    FMkdir = 25, (1, 0, 0);
    FRename = 26, (2, 0, 0);
    FUnlink = 27, (1, 0, 0);
    FVerifyNandImg = 28, (1, 0, 0);
    FSetNandProt = 29, (0, 0, 1);
    WriteFirmPart = 30, (1, 0, 1);
    LoadVerifyFirm = 31, (1, 0, 1);
    FirmLaunch = 32, (0, 0, 0);
    LoadVerifyUpdate = 33, (1, 1, 0);
    GetBootEnv = 34, (0, 0, 0);
    PreparePower = 35, (0, 0, 0);
    Panic = 36, (0, 0, 0);
    Exception = 37, (0, 0, 0);
}

impl CommandId {
    /// The full command word the sender uses for this command.
    pub const fn cmd_word(self) -> u32 {
        let (i, o, p) = self.layout();
        make_cmd(self as u8, i, o, p)
    }

    /// Number of argument words the command reads.
    pub const fn word_count(self) -> usize {
        let (i, o, p) = self.layout();
        (i as usize + o as usize) * 2 + p as usize
    }
}

/// A decoded command with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Mount { drive: u32 },
    Unmount { drive: u32 },
    IsDriveMounted { drive: u32 },
    GetFree { drive: u32, out: IpcBuffer },
    GetDevSize { dev: u32 },
    IsDevActive { dev: u32 },
    PrepRawAccess { dev: u32 },
    FinalRawAccess { handle: u32 },
    CreateDevBuf { size: u32 },
    FreeDevBuf { handle: u32 },
    ReadToDevBuf { fd: u32, offset: u32, size: u32, handle: u32 },
    WriteFromDevBuf { fd: u32, offset: u32, size: u32, handle: u32 },
    Open { path: IpcBuffer, mode: u32 },
    Read { fd: u32, buf: IpcBuffer },
    Write { fd: u32, buf: IpcBuffer },
    Sync { fd: u32 },
    Lseek { fd: u32, offset: u32 },
    Tell { fd: u32 },
    Size { fd: u32 },
    Close { fd: u32 },
    Expand { fd: u32, size: u32 },
    Stat { path: IpcBuffer, out: IpcBuffer },
    OpenDir { path: IpcBuffer },
    ReadDir { dd: u32, out: IpcBuffer, max_entries: u32 },
    CloseDir { dd: u32 },
    Mkdir { path: IpcBuffer },
    Rename { old: IpcBuffer, new: IpcBuffer },
    Unlink { path: IpcBuffer },
    VerifyNandImage { path: IpcBuffer },
    SetNandProtection { protect: bool },
    WriteFirmPartition { path: IpcBuffer, replace_sig: bool },
    LoadVerifyFirm { path: IpcBuffer, max_size: u32 },
    FirmLaunch,
    LoadVerifyUpdate { path: IpcBuffer, version_out: IpcBuffer },
    GetBootEnv,
    PreparePower,
    Panic,
    Exception,
}

impl Request {
    /// Decode the arguments of `id` from `words`.
    ///
    /// Returns `None` if `words` is shorter than the command needs.
    pub fn decode(id: CommandId, w: &[u32]) -> Option<Self> {
        if w.len() < id.word_count() {
            return None;
        }
        let buf = |i: usize| IpcBuffer::new(w[i], w[i + 1]);

        use CommandId::*;
        let req = match id {
            FMount => Request::Mount { drive: w[0] },
            FUnmount => Request::Unmount { drive: w[0] },
            FIsDriveMounted => Request::IsDriveMounted { drive: w[0] },
            FGetFree => Request::GetFree {
                drive: w[2],
                out: buf(0),
            },
            FGetDevSize => Request::GetDevSize { dev: w[0] },
            FIsDevActive => Request::IsDevActive { dev: w[0] },
            FPrepRawAccess => Request::PrepRawAccess { dev: w[0] },
            FFinalRawAccess => Request::FinalRawAccess { handle: w[0] },
            FCreateDevBuf => Request::CreateDevBuf { size: w[0] },
            FFreeDevBuf => Request::FreeDevBuf { handle: w[0] },
            FReadToDevBuf => Request::ReadToDevBuf {
                fd: w[0],
                offset: w[1],
                size: w[2],
                handle: w[3],
            },
            FWriteFromDevBuf => Request::WriteFromDevBuf {
                fd: w[0],
                offset: w[1],
                size: w[2],
                handle: w[3],
            },
            FOpen => Request::Open {
                path: buf(0),
                mode: w[2],
            },
            FRead => Request::Read {
                fd: w[2],
                buf: buf(0),
            },
            FWrite => Request::Write {
                fd: w[2],
                buf: buf(0),
            },
            FSync => Request::Sync { fd: w[0] },
            FLseek => Request::Lseek {
                fd: w[0],
                offset: w[1],
            },
            FTell => Request::Tell { fd: w[0] },
            FSize => Request::Size { fd: w[0] },
            FClose => Request::Close { fd: w[0] },
            FExpand => Request::Expand {
                fd: w[0],
                size: w[1],
            },
            FStat => Request::Stat {
                path: buf(0),
                out: buf(2),
            },
            FOpenDir => Request::OpenDir { path: buf(0) },
            FReadDir => Request::ReadDir {
                dd: w[2],
                out: buf(0),
                max_entries: w[3],
            },
            FCloseDir => Request::CloseDir { dd: w[0] },
            FMkdir => Request::Mkdir { path: buf(0) },
            FRename => Request::Rename {
                old: buf(0),
                new: buf(2),
            },
            FUnlink => Request::Unlink { path: buf(0) },
            FVerifyNandImg => Request::VerifyNandImage { path: buf(0) },
            FSetNandProt => Request::SetNandProtection { protect: w[0] != 0 },
            WriteFirmPart => Request::WriteFirmPartition {
                path: buf(0),
                replace_sig: w[2] != 0,
            },
            LoadVerifyFirm => Request::LoadVerifyFirm {
                path: buf(0),
                max_size: w[2],
            },
            FirmLaunch => Request::FirmLaunch,
            LoadVerifyUpdate => Request::LoadVerifyUpdate {
                path: buf(0),
                version_out: buf(2),
            },
            GetBootEnv => Request::GetBootEnv,
            PreparePower => Request::PreparePower,
            Panic => Request::Panic,
            Exception => Request::Exception,
        };
        Some(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_word_packs_fields() {
        let w = make_cmd(0x15, 1, 1, 0);
        assert_eq!(w, 0x1501_0100);
        assert_eq!(cmd_id(w), 0x15);
        assert_eq!(cmd_in_bufs(w), 1);
        assert_eq!(cmd_out_bufs(w), 1);
        assert_eq!(cmd_params(w), 0);
        assert_eq!(CommandId::FStat.cmd_word(), w);
    }

    #[test]
    fn ids_are_dense() {
        for (i, id) in CommandId::ALL.iter().enumerate() {
            assert_eq!(*id as usize, i);
            assert_eq!(CommandId::try_from(i as u8), Ok(*id));
        }
        assert_eq!(CommandId::try_from(38), Err(38));
        assert_eq!(CommandId::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn decodes_buffer_and_param_positions() {
        let words = [0x2000_0000, 0x100, 7, 16];
        assert_eq!(
            Request::decode(CommandId::FReadDir, &words),
            Some(Request::ReadDir {
                dd: 7,
                out: IpcBuffer::new(0x2000_0000, 0x100),
                max_entries: 16,
            })
        );
        assert_eq!(
            Request::decode(CommandId::FGetFree, &words),
            Some(Request::GetFree {
                drive: 7,
                out: IpcBuffer::new(0x2000_0000, 0x100),
            })
        );
        assert_eq!(
            Request::decode(CommandId::WriteFirmPart, &[1, 2, 0]),
            Some(Request::WriteFirmPartition {
                path: IpcBuffer::new(1, 2),
                replace_sig: false,
            })
        );
    }

    #[test]
    fn short_word_arrays_are_rejected() {
        assert_eq!(Request::decode(CommandId::FRename, &[1, 2, 3]), None);
        assert_eq!(Request::decode(CommandId::FMount, &[]), None);
        assert_eq!(Request::decode(CommandId::GetBootEnv, &[]), Some(Request::GetBootEnv));
    }
}
