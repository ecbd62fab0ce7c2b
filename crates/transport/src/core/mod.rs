//! The main concepts of this mod are:
//!
//! The [TransportInterface](transport::TransportInterface) trait defines how to
//! join a room through the external P2P library and query the connectedness of
//! its tracker relays. See the [transport] module.
//!
//! The [RoomInterface](transport::RoomInterface) trait is one live room
//! membership: the peer set, liveness pings, presence announcement and media
//! stream attachment. See the [transport] module.
//!
//! The [RoomCallback](callback::RoomCallback) trait is used to let the
//! lifecycle core handle the events of a room, including peer join/leave,
//! inbound liveness pings and application messages. See the [callback] module.

pub mod callback;
pub mod transport;
