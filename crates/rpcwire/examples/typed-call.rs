//! Typed call example: registers a plain-old-data argument type and sends
//! it over a Unix socket pair.
//!
//! Run with:
//!   cargo run --example typed-call

use rpcwire::frame::{MessageReader, MessageWriter};
use rpcwire::serial::Serializer;

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::os::unix::net::UnixStream;
    use std::thread;

    let serializer = Serializer::new();
    serializer.register_unmanaged::<[f32; 3]>()?;

    let (left, right) = UnixStream::pair()?;

    let server = thread::spawn(move || -> Result<(), rpcwire::frame::FrameError> {
        let mut reader = MessageReader::new(right);
        reader.serializer().register_unmanaged::<[f32; 3]>()?;
        for _ in 0..2 {
            let message = reader.read_message()?;
            let points: Vec<[f32; 3]> = message.decode(reader.serializer())?;
            eprintln!(
                "[server] {} points via {}",
                points.len(),
                String::from_utf8_lossy(message.routing())
            );
        }
        Ok(())
    });

    let mut writer = MessageWriter::new(left);
    let points = vec![[0.0f32, 1.0, 2.0], [3.0, 4.0, 5.0]];
    writer.send_value(b"geo.plot", &points, &serializer)?;
    writer.send_value(b"geo.plot", &Vec::<[f32; 3]>::new(), &serializer)?;

    server
        .join()
        .map_err(|_| "server thread panicked")??;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("typed-call needs Unix sockets");
}
