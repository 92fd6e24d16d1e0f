use std::fs;
use std::io::Read;

use rpcwire_frame::{BufferConfig, ContiguousBuffer, Message, PeerId, ReceiveState};
use rpcwire_serial::Serializer;
use tracing::{info, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_messages, OutputFormat, Received};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = read_input(&args)?;

    let config = BufferConfig {
        max_message_size: args.max_message_size,
        allow_partial_header: !args.strict,
        scratch_capacity: args.chunk_size,
        ..BufferConfig::default()
    };
    let mut buffer = ContiguousBuffer::with_config(PeerId::new(args.peer.as_str()), config);
    let serializer = Serializer::new();

    let mut messages: Vec<(Message, bool)> = Vec::new();
    let replay = buffer.feed(&capture, &serializer, |delivery| {
        let assembled = delivery.can_take_ownership();
        messages.push((delivery.into_message(), assembled));
    });

    let received: Vec<Received<'_>> = messages
        .iter()
        .enumerate()
        .map(|(index, (message, assembled))| Received {
            index,
            message,
            assembled: *assembled,
        })
        .collect();
    print_messages(&received, format);

    replay.map_err(|err| frame_error("decode failed", err))?;

    if buffer.state() != ReceiveState::Idle {
        warn!(
            pending = buffer.pending_len(),
            expected = ?buffer.pending_total(),
            "capture ends mid-message"
        );
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "capture ends mid-message ({} bytes pending)",
                buffer.pending_len()
            ),
        ));
    }

    info!(
        messages = received.len(),
        bytes = capture.len(),
        "capture decoded"
    );
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if args.input.as_os_str() == "-" {
        let mut capture = Vec::new();
        std::io::stdin()
            .read_to_end(&mut capture)
            .map_err(|err| io_error("read stdin failed", err))?;
        return Ok(capture);
    }
    fs::read(&args.input).map_err(|err| {
        io_error(&format!("read {} failed", args.input.display()), err)
    })
}
