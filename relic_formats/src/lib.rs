pub mod bank;
pub mod bitstream;
pub mod error;
pub mod icocur;
pub mod lzw;
pub mod ppic;
pub mod textdb;

pub use bank::{BankCodec, BankEntry, BankFile, BankPayload};
pub use bitstream::{LsbBitReader, LsbBitWriter, MsbBitReader, MsbBitWriter};
pub use error::{DecodeError, Result};
pub use icocur::{IcoCurEntry, IcoCurFile, IcoCurImage, IcoCurKind, is_png_payload};
pub use ppic::{PpicImage, PpicMetadata, decode_ppic, peek_ppic_metadata};
pub use textdb::{TextDb, TextEntry};
