pub mod body;
pub mod codec;
pub mod connection;
pub mod connector;
pub mod error;
pub mod frame;
pub mod parser;

pub use codec::StompCodec;
pub use connection::{Connection, ConnectionEvent, ConnectionEvents};
pub use connector::{Connector, ConnectorConfig, SessionEvent, SessionEvents};
pub use error::ClientError;
pub use frame::Frame;
pub use parser::{ParseState, Parser};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_frame_display() {
        let f = Frame::new("CONNECT")
            .header("accept-version", "1.0,1.1")
            .set_body(b"hello".to_vec());
        let s = format!("{}", f);
        assert!(s.contains("CONNECT"));
        assert!(s.contains("Body (5 bytes)"));
    }

    #[test]
    fn smoke_parse_own_output() {
        let frame = Frame::new("SEND")
            .header("destination", "/queue/a")
            .set_body(b"hi".to_vec());
        let mut parser = Parser::new();
        let frames = parser.push_slice(&frame.to_buffer());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, "SEND");
        assert_eq!(frames[0].body, b"hi");
    }
}
