// Tenantshift - Infrastructure Layer
// Adapters for the domain ports:
// - persistence::postgres: control-plane repositories, the tenant
//   datastore adapter and the connection cache, all over sqlx
// - persistence::in_memory: TEST ONLY fakes for every port

pub mod persistence;

pub use persistence::*;
