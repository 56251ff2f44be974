//! Registration and lookup behaviour for the handler tables.

use rstest::{fixture, rstest};

use super::*;
use crate::message::{RequestContext, group, priority};

struct Tagged(u8);

#[async_trait(?Send)]
impl CommandHandler for Tagged {
    async fn invoke(&self, _request: Request) -> Response {
        Response::success(vec![self.0])
    }
}

#[fixture]
fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
}

async fn tag_for(registry: &HandlerRegistry, route: Route, cmd: Cmd) -> Option<u8> {
    let entry = registry.lookup(route, cmd)?;
    let request = Request::new(RequestContext::new(netfn::APP, cmd, 0), Vec::new());
    let response = entry.handler().invoke(request).await;
    response.payload.first().copied()
}

#[rstest]
#[tokio::test]
async fn equal_priority_replaces_and_lower_priority_is_refused(mut registry: HandlerRegistry) {
    let route = Route::Standard(netfn::APP);
    registry
        .register_standard(5, netfn::APP, 0x01, Privilege::User, Tagged(b'A'))
        .expect("first registration");
    registry
        .register_standard(5, netfn::APP, 0x01, Privilege::User, Tagged(b'B'))
        .expect("equal priority replaces");
    let error = registry
        .register_standard(4, netfn::APP, 0x01, Privilege::User, Tagged(b'C'))
        .expect_err("lower priority refused");

    assert_eq!(
        error,
        RegistrationError::Superseded {
            route,
            cmd: 0x01,
            existing: 5,
            requested: 4,
        }
    );
    assert_eq!(tag_for(&registry, route, 0x01).await, Some(b'B'));
    assert_eq!(registry.len(), 1);
}

#[rstest]
#[tokio::test]
async fn higher_priority_replaces(mut registry: HandlerRegistry) {
    registry
        .register_standard(priority::OPENBMC_BASE, netfn::APP, 0x01, Privilege::User, Tagged(1))
        .expect("base registration");
    registry
        .register_standard(priority::OEM_BASE, netfn::APP, 0x01, Privilege::Admin, Tagged(2))
        .expect("override registration");

    let entry = registry
        .lookup(Route::Standard(netfn::APP), 0x01)
        .expect("entry present");
    assert_eq!(entry.priority(), priority::OEM_BASE);
    assert_eq!(entry.privilege(), Privilege::Admin);
    assert_eq!(tag_for(&registry, Route::Standard(netfn::APP), 0x01).await, Some(2));
}

#[rstest]
#[case::odd(0x07)]
#[case::response_bit(0x2D)]
#[case::unassigned(0x10)]
#[case::past_oem(0x40)]
fn rejects_invalid_standard_netfns(mut registry: HandlerRegistry, #[case] value: NetFn) {
    let error = registry
        .register_standard(priority::MAX, value, 0x01, Privilege::User, Tagged(0))
        .expect_err("netfn must be rejected");
    assert_eq!(error, RegistrationError::InvalidNetFn { netfn: value });
    assert!(registry.is_empty());
}

#[rstest]
#[case::chassis(netfn::CHASSIS)]
#[case::transport(netfn::TRANSPORT)]
#[case::group(netfn::GROUP)]
#[case::oem_eight(netfn::OEM_EIGHT)]
fn accepts_valid_standard_netfns(mut registry: HandlerRegistry, #[case] value: NetFn) {
    registry
        .register_standard(priority::MAX, value, 0x01, Privilege::User, Tagged(0))
        .expect("netfn accepted");
    assert!(registry.lookup(Route::Standard(value), 0x01).is_some());
}

#[rstest]
#[tokio::test]
async fn wildcard_serves_unregistered_commands(mut registry: HandlerRegistry) {
    let route = Route::Standard(netfn::APP);
    registry
        .register_standard(priority::OPENBMC_BASE, netfn::APP, CMD_WILDCARD, Privilege::User, Tagged(b'W'))
        .expect("wildcard registration");
    registry
        .register_standard(priority::OPENBMC_BASE, netfn::APP, 0x01, Privilege::User, Tagged(b'E'))
        .expect("exact registration");

    assert_eq!(tag_for(&registry, route, 0x42).await, Some(b'W'));
    assert_eq!(tag_for(&registry, route, 0x01).await, Some(b'E'));

    assert!(registry.unregister(route, CMD_WILDCARD).is_some());
    assert!(registry.lookup(route, 0x42).is_none());
    assert!(registry.lookup(route, 0x01).is_some());
}

#[rstest]
#[tokio::test]
async fn tables_are_independent(mut registry: HandlerRegistry) {
    registry
        .register_standard(priority::OPENBMC_BASE, netfn::CHASSIS, 0x01, Privilege::User, Tagged(1))
        .expect("standard");
    registry
        .register_group(priority::OPENBMC_BASE, group::PICMG, 0x01, Privilege::User, Tagged(2))
        .expect("group");
    registry
        .register_oem(priority::OPENBMC_BASE, 0x0000_0000, 0x01, Privilege::User, Tagged(3))
        .expect("oem");

    assert_eq!(tag_for(&registry, Route::Standard(netfn::CHASSIS), 0x01).await, Some(1));
    assert_eq!(tag_for(&registry, Route::Group(group::PICMG), 0x01).await, Some(2));
    assert_eq!(tag_for(&registry, Route::Oem(0), 0x01).await, Some(3));
    assert!(registry.lookup(Route::Group(group::DCMI), 0x01).is_none());
    assert_eq!(registry.len(), 3);
}

#[rstest]
fn group_and_oem_accept_any_selector(mut registry: HandlerRegistry) {
    registry
        .register_group(priority::OPENBMC_BASE, 0xFF, 0x10, Privilege::User, Tagged(0))
        .expect("any group selector");
    registry
        .register_oem(priority::OPENBMC_BASE, 0x00FF_FFFF, 0x10, Privilege::User, Tagged(0))
        .expect("any iana selector");
    assert_eq!(registry.len(), 2);
}

#[rstest]
fn clear_drops_every_table(mut registry: HandlerRegistry) {
    registry
        .register_standard(priority::OPENBMC_BASE, netfn::APP, 0x01, Privilege::User, Tagged(0))
        .expect("standard");
    registry
        .register_group(priority::OPENBMC_BASE, group::DCMI, 0x01, Privilege::User, Tagged(0))
        .expect("group");
    registry.clear();
    assert!(registry.is_empty());
    assert!(registry.lookup(Route::Standard(netfn::APP), 0x01).is_none());
}

#[rstest]
#[tokio::test]
async fn closures_register_as_handlers(mut registry: HandlerRegistry) {
    let handler = handler_fn(|request: Request| async move {
        Response::success(request.payload.iter().rev().copied().collect())
    });
    registry
        .register_standard(priority::OPENBMC_BASE, netfn::APP, 0x05, Privilege::User, handler)
        .expect("closure registration");

    let entry = registry
        .lookup(Route::Standard(netfn::APP), 0x05)
        .expect("entry present");
    let request = Request::new(RequestContext::new(netfn::APP, 0x05, 0), vec![1, 2, 3]);
    let response = entry.handler().invoke(request).await;
    assert_eq!(response.payload, vec![3, 2, 1]);
}
