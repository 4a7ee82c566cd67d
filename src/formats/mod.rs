//! On-media binary formats.
//!
//! Parsers follow the same conventions:
//!
//! * **Generic over** [`std::io::Read`] + [`std::io::Seek`] - pass a
//!   [`std::io::Cursor`] over a sector buffer, a file holding a NAND image,
//!   or anything else that implements both traits.
//! * **Metadata only** - `parse` reads headers and builds an in-memory
//!   description; sector data is never loaded.
//! * **Crypto is separate** - headers handled here are stored in plaintext;
//!   use [`crate::device::nand_crypt`] for encrypted regions.
//!
//! | Module   | Format | Description |
//! |----------|--------|-------------|
//! | [`ncsd`] | NCSD   | NAND volume header with the eight-slot partition table |

pub mod ncsd;
