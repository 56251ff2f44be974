//! Request routing from an execute call to a registered handler.
//!
//! Everything up to the handler invocation runs synchronously: context
//! resolution, selector decoding, filtering, lookup and the privilege check
//! never suspend. Only the handler itself may await.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error};

use crate::channel::ChannelResolver;
use crate::context::{ContextBuilder, Options};
use crate::filter::FilterChain;
use crate::message::{
    Cmd, CompletionCode, IANA_LEN, Lun, NetFn, Request, RequestContext, Response, Route,
    decode_iana, netfn,
};
use crate::registry::HandlerRegistry;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Inbound execute call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    /// Connection identity of the caller.
    pub sender: String,
    /// Request network function.
    pub netfn: NetFn,
    /// Logical unit, echoed in the response.
    pub lun: Lun,
    /// Command byte.
    pub cmd: Cmd,
    /// Raw payload, including any group or IANA selector.
    pub payload: Vec<u8>,
    /// Typed request options.
    pub options: Options,
}

/// Result of an execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResponse {
    /// Response network function (request network function with bit 0 set).
    pub netfn: NetFn,
    /// Echoed logical unit.
    pub lun: Lun,
    /// Echoed command byte.
    pub cmd: Cmd,
    /// Completion code.
    pub cc: CompletionCode,
    /// Response payload.
    pub payload: Vec<u8>,
}

/// Owns the handler registry, the filter chain and the context builder.
#[derive(Debug)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    filters: FilterChain,
    context: ContextBuilder,
}

impl Dispatcher {
    /// Assembles a dispatcher from populated tables.
    #[must_use]
    pub fn new(registry: HandlerRegistry, filters: FilterChain, context: ContextBuilder) -> Self {
        Self {
            registry,
            filters,
            context,
        }
    }

    /// Registered handlers.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Registered filters.
    #[must_use]
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Connection-to-channel map, updated by owner-change events.
    #[must_use]
    pub fn channels(&self) -> &ChannelResolver {
        self.context.channels()
    }

    /// Executes one request. Every call yields a well-formed response.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecuteResponse {
        let ExecuteRequest {
            sender,
            netfn,
            lun,
            cmd,
            payload,
            options,
        } = request;

        let response = match self.context.build(&sender, netfn, cmd, &options) {
            Ok(context) => self.route(context, payload).await,
            Err(cc) => Response::error(cc),
        };

        debug!(
            target: DISPATCH_TARGET,
            sender = sender.as_str(),
            netfn,
            lun,
            cmd,
            cc = %response.cc,
            "request completed"
        );
        ExecuteResponse {
            netfn: netfn::response(netfn),
            lun,
            cmd,
            cc: response.cc,
            payload: response.payload,
        }
    }

    async fn route(&self, mut context: RequestContext, payload: Vec<u8>) -> Response {
        let selected = match Selected::split(context.netfn, payload) {
            Ok(selected) => selected,
            Err(cc) => {
                debug!(
                    target: DISPATCH_TARGET,
                    netfn = context.netfn,
                    cmd = context.cmd,
                    "selector prefix too short"
                );
                return Response::error(cc);
            }
        };
        context.route = selected.route;

        let mut response = self.run(Request::new(context, selected.payload)).await;
        response.prepend(&selected.prefix);
        response
    }

    async fn run(&self, request: Request) -> Response {
        let rejection = self.filters.run(&request);
        let RequestContext {
            route,
            cmd,
            privilege,
            ..
        } = request.context;

        let Some(entry) = self.registry.lookup(route, cmd) else {
            debug!(target: DISPATCH_TARGET, %route, cmd, "no handler registered");
            return Response::error(CompletionCode::INVALID_COMMAND);
        };
        if let Some(cc) = rejection {
            debug!(target: DISPATCH_TARGET, %route, cmd, %cc, "request rejected by filter");
            return Response::error(cc);
        }
        if !privilege.satisfies(entry.privilege()) {
            debug!(
                target: DISPATCH_TARGET,
                %route,
                cmd,
                %privilege,
                required = %entry.privilege(),
                "insufficient privilege"
            );
            return Response::error(CompletionCode::INSUFFICIENT_PRIVILEGE);
        }

        debug!(target: DISPATCH_TARGET, %route, cmd, "invoking handler");
        match AssertUnwindSafe(entry.handler().invoke(request))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(_) => {
                error!(target: DISPATCH_TARGET, %route, cmd, "handler panicked");
                Response::error(CompletionCode::UNSPECIFIED_ERROR)
            }
        }
    }

    /// Splits the dispatcher back into its tables.
    #[must_use]
    pub fn into_parts(self) -> (HandlerRegistry, FilterChain, ContextBuilder) {
        (self.registry, self.filters, self.context)
    }

    /// Drains the handler registry, then the filter chain.
    pub fn teardown(self) -> Drained {
        let (mut registry, mut filters, _context) = self.into_parts();
        let drained = Drained {
            handlers: registry.len(),
            filters: filters.len(),
        };
        registry.clear();
        filters.clear();
        debug!(
            target: DISPATCH_TARGET,
            handlers = drained.handlers,
            filters = drained.filters,
            "dispatcher tables drained"
        );
        drained
    }
}

/// Entries released by [`Dispatcher::teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    /// Handler slots cleared.
    pub handlers: usize,
    /// Filters cleared.
    pub filters: usize,
}

/// Payload split into its selector and inner payload.
struct Selected {
    route: Route,
    prefix: Vec<u8>,
    payload: Vec<u8>,
}

impl Selected {
    fn split(netfn: NetFn, payload: Vec<u8>) -> Result<Self, CompletionCode> {
        match netfn {
            netfn::GROUP => {
                let Some((group, inner)) = payload.split_first() else {
                    return Err(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
                };
                Ok(Self {
                    route: Route::Group(*group),
                    prefix: vec![*group],
                    payload: inner.to_vec(),
                })
            }
            netfn::OEM => {
                let Some((iana, inner)) = payload.split_first_chunk::<IANA_LEN>() else {
                    return Err(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
                };
                Ok(Self {
                    route: Route::Oem(decode_iana(*iana)),
                    prefix: iana.to_vec(),
                    payload: inner.to_vec(),
                })
            }
            _ => Ok(Self {
                route: Route::Standard(netfn),
                prefix: Vec::new(),
                payload,
            }),
        }
    }
}
