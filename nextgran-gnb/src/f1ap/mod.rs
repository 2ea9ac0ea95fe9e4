//! F1AP boundary: typed messages, codec collaborators and inbound routing

mod codec;
mod messages;
mod router;

pub use codec::{
    DecodeError, EncodingNotifier, F1apCodec, F1apMessageNotifier, PduNotifier, RrcCodec,
    YamlCodec,
};
pub use messages::{
    F1SetupFailure, F1SetupRequest, F1SetupResponse, F1apMessage, RrcMessage, ServedCell,
    UeContextReleaseCommand, UeContextReleaseComplete, UeContextSetupFailure,
    UeContextSetupRequest, UeContextSetupResponse,
};
pub use router::{F1apMessageHandler, F1apRouter};
