mod harness;
mod session;
mod transport;
