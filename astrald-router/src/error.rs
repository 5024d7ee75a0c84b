pub use astrald_net::NetError as RouterError;
