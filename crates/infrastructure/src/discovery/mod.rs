mod mdns;

pub use mdns::MdnsBackend;
