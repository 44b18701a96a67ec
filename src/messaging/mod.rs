mod publish;
mod redpanda;

pub use publish::run_publish;
pub use redpanda::RedpandaClient;
