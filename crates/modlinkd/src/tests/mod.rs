mod server_behaviour;
mod support;
