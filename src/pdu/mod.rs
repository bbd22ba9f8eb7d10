//! Protocol data unit types for the DICOM upper layer protocol (PS3.8).

use snafu::{Backtrace, Snafu};

pub mod commands;
pub mod generated;
pub mod reader;
pub mod writer;

pub use commands::{Command, CommandField, CommandDatasetType, Priority};
pub use generated::{
    CEchoRq, CEchoRsp, CFindCncl, CFindRq, CFindRsp, CMoveCncl, CMoveRq, CMoveRsp, CStoreRq,
    CStoreRsp,
};
pub use reader::read_pdu;
pub use writer::write_pdu;

/// A full protocol data unit, as exchanged over the association's TCP stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Pdu {
    AssociationRQ(AssociationRQ),
    AssociationAC(AssociationAC),
    AssociationRJ(AssociationRJ),
    PData { data: Vec<PDataValue> },
    ReleaseRQ,
    ReleaseRP,
    AbortRQ { source: AbortRQSource },
    Unknown { pdu_type: u8, data: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssociationRQ {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssociationAC {
    pub protocol_version: u16,
    pub application_context_name: String,
    pub called_ae_title: String,
    pub calling_ae_title: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssociationRJ {
    pub result: AssociationRJResult,
    pub source: AssociationRJSource,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationRJResult {
    Permanent,
    Transient,
}

impl AssociationRJResult {
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Permanent),
            2 => Some(Self::Transient),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderASCE(AssociationRJServiceProviderASCEReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            1 => Some(Self::ServiceUser(AssociationRJServiceUserReason::from(
                reason,
            )?)),
            2 => Some(Self::ServiceProviderASCE(
                AssociationRJServiceProviderASCEReason::from(reason)?,
            )),
            3 => Some(Self::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::from(reason),
            )),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

impl AssociationRJServiceUserReason {
    fn from(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::NoReasonGiven,
            2 => Self::ApplicationContextNameNotSupported,
            3 => Self::CallingAETitleNotRecognized,
            7 => Self::CalledAETitleNotRecognized,
            other => Self::Reserved(other),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationRJServiceProviderASCEReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

impl AssociationRJServiceProviderASCEReason {
    fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::NoReasonGiven),
            2 => Some(Self::ProtocolVersionNotSupported),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

impl AssociationRJServiceProviderPresentationReason {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::TemporaryCongestion,
            2 => Self::LocalLimitExceeded,
            other => Self::Reserved(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortRQSource {
    ServiceUser,
    Reserved,
    ServiceProvider(AbortRQServiceProviderReason),
}

impl AbortRQSource {
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            0 => Some(Self::ServiceUser),
            1 => Some(Self::Reserved),
            2 => Some(Self::ServiceProvider(AbortRQServiceProviderReason::from(
                reason,
            )?)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    Reserved,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameter,
}

impl AbortRQServiceProviderReason {
    fn from(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::ReasonNotSpecified,
            1 => Self::UnrecognizedPdu,
            2 => Self::UnexpectedPdu,
            3 => Self::Reserved,
            4 => Self::UnrecognizedPduParameter,
            5 => Self::UnexpectedPduParameter,
            6 => Self::InvalidPduParameter,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PresentationContextProposed {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub transfer_syntax: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PresentationContextResultReason {
    Acceptance,
    UserRejection,
    NoReason,
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

impl PresentationContextResultReason {
    pub fn from(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Acceptance,
            1 => Self::UserRejection,
            2 => Self::NoReason,
            3 => Self::AbstractSyntaxNotSupported,
            4 => Self::TransferSyntaxesNotSupported,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PduVariableItem {
    Unknown(u8),
    ApplicationContext(String),
    PresentationContextProposed(PresentationContextProposed),
    PresentationContextResult(PresentationContextResult),
    UserVariables(Vec<UserVariableItem>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserVariableItem {
    Unknown(u8, Vec<u8>),
    MaxLength(u32),
    ImplementationClassUID(String),
    ImplementationVersionName(String),
    SopClassExtendedNegotiationSubItem(String, Vec<u8>),
    UserIdentityItem(UserIdentity),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserIdentityType {
    Username,
    UsernameAndPassword,
    Kerberos,
    Saml,
    Jwt,
}

impl UserIdentityType {
    pub fn from(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Username,
            2 => Self::UsernameAndPassword,
            3 => Self::Kerberos,
            4 => Self::Saml,
            5 => Self::Jwt,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Username => 1,
            Self::UsernameAndPassword => 2,
            Self::Kerberos => 3,
            Self::Saml => 4,
            Self::Jwt => 5,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserIdentity {
    positive_response_requested: bool,
    identity_type: UserIdentityType,
    primary_field: Vec<u8>,
    secondary_field: Vec<u8>,
}

impl UserIdentity {
    pub fn new(
        positive_response_requested: bool,
        identity_type: UserIdentityType,
        primary_field: Vec<u8>,
        secondary_field: Vec<u8>,
    ) -> Self {
        UserIdentity {
            positive_response_requested,
            identity_type,
            primary_field,
            secondary_field,
        }
    }

    pub fn positive_response_requested(&self) -> bool {
        self.positive_response_requested
    }

    pub fn identity_type(&self) -> UserIdentityType {
        self.identity_type
    }

    pub fn primary_field(&self) -> &[u8] {
        &self.primary_field
    }

    pub fn secondary_field(&self) -> &[u8] {
        &self.secondary_field
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    pub is_last: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PDataValueType {
    Command,
    Data,
}

/// Error produced while serializing a PDU to bytes.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum WriteError {
    #[snafu(display("Could not write PDU field `{}`", field))]
    WriteField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not write {} reserved bytes", bytes))]
    WriteReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Could not encode text field `{}`", field))]
    EncodeField {
        field: &'static str,
        #[snafu(backtrace)]
        source: dicom_encoding::text::EncodeTextError,
    },
    #[snafu(display("Could not write chunk `{}`", name))]
    WriteChunk {
        name: &'static str,
        #[snafu(backtrace)]
        source: Box<writer::WriteChunkError>,
    },
}
