//! # STPLink Core Library
//!
//! Host side of the Shell Transport Protocol (STP) used by the DIO add-in
//! card and the automotive sequence MCU.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - CRC-8 protected frame encoding and incremental decoding
//! - The per-byte ACK/NACK transport, both directions
//! - Port discovery (USB autodetection for the DIO card, explicit UART for
//!   the automotive MCU) with exclusive port claims
//! - A command session that maps every failure onto one status taxonomy
//! - Typed managers for both MCUs
//!
//! ## Example
//!
//! ```rust,ignore
//! use stplink_core::prelude::*;
//!
//! let session = Session::claim(SessionConfig::dio_card())?;
//! let dio = DioCard::new(SharedSession::new(session));
//!
//! dio.set_do(2, 1)?;
//! println!("DI3 = {}", dio.get_di(3)?);
//! ```

pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{AutomotiveController, AutomotiveSettings, DioCard};
    pub use crate::protocol::{
        Arg, Kind, ProtocolError, Response, Role, Session, SessionConfig, SharedSession, Status,
        Value,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
