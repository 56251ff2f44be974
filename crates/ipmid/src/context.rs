//! Builds the [`RequestContext`] for an inbound request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use ipmid_config::MediumType;

use crate::channel::ChannelResolver;
use crate::message::{Cmd, CompletionCode, NetFn, RequestContext};
use crate::privilege::Privilege;

const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::context");

/// Option key carrying the session privilege.
pub const OPTION_PRIVILEGE: &str = "privilege";
/// Option key carrying the authenticated user id.
pub const OPTION_USER_ID: &str = "userId";
/// Option key carrying the session id.
pub const OPTION_SESSION_ID: &str = "currentSessionId";
/// Option key carrying the IPMB requestor address.
pub const OPTION_RQ_SA: &str = "rqSA";

/// Typed value attached to a request option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionValue {
    /// Boolean.
    Bool(bool),
    /// Unsigned byte.
    Byte(u8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    Uint16(u16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Unsigned 32-bit integer.
    Uint32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    Uint64(u64),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
}

/// Request options keyed by name.
pub type Options = BTreeMap<String, OptionValue>;

/// Derives channel, credentials and privilege for a request.
#[derive(Debug)]
pub struct ContextBuilder {
    channels: ChannelResolver,
}

impl ContextBuilder {
    /// Creates a builder resolving channels through `channels`.
    #[must_use]
    pub fn new(channels: ChannelResolver) -> Self {
        Self { channels }
    }

    /// Channel resolver consulted for every request.
    #[must_use]
    pub fn channels(&self) -> &ChannelResolver {
        &self.channels
    }

    /// Builds the context for a request from `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionCode::DESTINATION_UNAVAILABLE`] when the channel is
    /// indeterminate, and [`CompletionCode::UNSPECIFIED_ERROR`] when a
    /// session-capable channel lacks well-typed session credentials.
    pub fn build(
        &self,
        connection: &str,
        netfn: NetFn,
        cmd: Cmd,
        options: &Options,
    ) -> Result<RequestContext, CompletionCode> {
        let Some(channel) = self.channels.resolve(connection) else {
            error!(
                target: CONTEXT_TARGET,
                sender = connection,
                netfn,
                cmd,
                "error determining source IPMI channel"
            );
            return Err(CompletionCode::DESTINATION_UNAVAILABLE);
        };

        let mut context = RequestContext::new(netfn, cmd, channel);
        let table = self.channels.table();
        if table.session_support(channel).has_sessions() {
            let Some(credentials) = SessionCredentials::from_options(options) else {
                error!(
                    target: CONTEXT_TARGET,
                    channel,
                    netfn,
                    cmd,
                    "error determining IPMI session credentials"
                );
                return Err(CompletionCode::UNSPECIFIED_ERROR);
            };
            context.privilege = credentials.privilege;
            context.user_id = credentials.user_id;
            context.session_id = credentials.session_id;
        } else {
            context.privilege = Privilege::Admin;
            if table.medium_type(channel) == MediumType::Ipmb
                && let Some(OptionValue::Int(rq_sa)) = options.get(OPTION_RQ_SA)
            {
                context.rq_sa = *rq_sa;
            }
        }

        debug!(
            target: CONTEXT_TARGET,
            sender = connection,
            netfn,
            cmd,
            channel,
            user_id = context.user_id,
            session_id = context.session_id,
            privilege = %context.privilege,
            rq_sa = context.rq_sa,
            "set up ipmi context"
        );
        Ok(context)
    }
}

struct SessionCredentials {
    privilege: Privilege,
    user_id: u8,
    session_id: u32,
}

impl SessionCredentials {
    fn from_options(options: &Options) -> Option<Self> {
        let Some(OptionValue::Int(privilege)) = options.get(OPTION_PRIVILEGE) else {
            return None;
        };
        let Some(OptionValue::Int(user_id)) = options.get(OPTION_USER_ID) else {
            return None;
        };
        let Some(OptionValue::Uint32(session_id)) = options.get(OPTION_SESSION_ID) else {
            return None;
        };
        Some(Self {
            privilege: Privilege::try_from(i64::from(*privilege)).ok()?,
            user_id: u8::try_from(*user_id).ok()?,
            session_id: *session_id,
        })
    }
}
