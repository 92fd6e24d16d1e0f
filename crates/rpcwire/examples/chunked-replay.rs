//! Chunked replay example: feeds two messages through a contiguous buffer
//! in deliberately awkward receive sizes and prints each delivery.
//!
//! Run with:
//!   cargo run --example chunked-replay

use rpcwire::frame::{ContiguousBuffer, MessageWriter, PeerId, ReceiveState};
use rpcwire::serial::Serializer;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let serializer = Serializer::new();

    // Two messages back to back, as a transport would see them.
    let mut writer = MessageWriter::new(Vec::new());
    writer.send_value(b"math.sum", &vec![1u32, 2, 3, 4], &serializer)?;
    writer.send_value(b"greet", &String::from("hello"), &serializer)?;
    let wire = writer.into_inner();

    let mut buffer = ContiguousBuffer::new(PeerId::from("replay"));
    buffer.set_progress_observer(|progress| {
        eprintln!(
            "[progress] envelope={} received={} expected={}",
            progress.envelope.is_some(),
            progress.received,
            progress.expected
        );
    });

    let mut at = 0;
    for size in [5usize, 10, 15, 40].into_iter().cycle() {
        if at >= wire.len() {
            break;
        }
        let end = (at + size).min(wire.len());
        let chunk = &wire[at..end];
        buffer.scratch_mut()?[..chunk.len()].copy_from_slice(chunk);
        buffer.process(chunk.len(), &serializer, |delivery| {
            let routing = String::from_utf8_lossy(delivery.envelope.routing()).into_owned();
            let owned = delivery.can_take_ownership();
            match routing.as_str() {
                "math.sum" => match delivery.decode::<Vec<u32>>() {
                    Ok(values) => eprintln!(
                        "[deliver] {routing} owned={owned} sum={}",
                        values.iter().sum::<u32>()
                    ),
                    Err(err) => eprintln!("[deliver] {routing} decode failed: {err}"),
                },
                _ => match delivery.decode::<String>() {
                    Ok(text) => eprintln!("[deliver] {routing} owned={owned} text={text}"),
                    Err(err) => eprintln!("[deliver] {routing} decode failed: {err}"),
                },
            }
        })?;
        at = end;
    }

    assert_eq!(buffer.state(), ReceiveState::Idle);
    buffer.dispose();
    Ok(())
}
