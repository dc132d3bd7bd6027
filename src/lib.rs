//! # lbr
//!
//! C64 LBR archive support: create, list, extract and modify archives.
//!
//! An LBR archive is a flat container: a textual directory followed by
//! the concatenated raw payload bytes of each entry, in directory order:
//!
//! ```text
//! "DWB" <space> <decimal-count> <space> <CR>
//! repeated <decimal-count> times:
//!   <name> <CR> <type> <CR> <space> <decimal-length> <space> <CR>
//! then, for each entry with length > 0, its payload bytes
//! ```
//!
//! Names and type tags are stored in PETSCII; the [`petscii`] module maps
//! them to and from portable ASCII (a lossy, caller-switchable mapping).
//! Type `D` marks a deleted entry: a tombstone whose payload bytes have
//! been removed but whose name slot remains.
//!
//! There is no offset table. An entry's payload position is the end of
//! the directory plus the lengths of every entry before it, so every
//! operation is a single forward walk over the byte stream. Mutating
//! operations ([`delete`], [`wipe`], [`change_type`], [`append`]) stream
//! the source archive into a fresh temporary file and atomically rename
//! it into place; a failure mid-rewrite leaves the original untouched.
//!
//! Declared lengths outside `[0, 1 MiB]` mark an archive as suspect from
//! that entry on. Listing flags such entries and carries on; extraction
//! degrades to a raw dump of the remaining bytes; offset-dependent
//! operations refuse to continue.

pub mod archive;
pub mod decoder;
pub mod encoder;
pub mod mutate;
pub mod petscii;

pub use archive::{
    extension_for, numeric_name_order, type_tag_for, AppendOptions, BuildOptions, Entry,
    ExtractOptions, LbrError, ListOptions, MAX_SANE_LENGTH, SIGNATURE,
};
pub use decoder::{extract, list, locate, Listing, Location, Reader, Scanner};
pub use encoder::build;
pub use mutate::{append, change_type, delete, wipe};
pub use petscii::TextConfig;
