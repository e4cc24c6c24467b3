pub mod container_routes;
pub mod workspace_routes;
