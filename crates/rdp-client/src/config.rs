/// Limits applied to the wire stream.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Largest JSON body accepted from the debuggee.
    pub max_message_bytes: usize,
    /// Longest decimal length prefix accepted before the `:` separator.
    pub max_length_prefix_digits: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024 * 1024,
            max_length_prefix_digits: 20,
        }
    }
}
