/// Delivery of server events to connected sockets.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Inbound message routing from sockets to the room registry.
pub mod gateway;
/// Health check service.
pub mod health_service;
/// Eviction of ended rooms.
pub mod room_janitor;
/// Read-only room projections.
pub mod room_service;
/// Dispatcher applying question countdown expiries.
pub mod timer_service;
/// WebSocket connection lifecycle.
pub mod websocket_service;
