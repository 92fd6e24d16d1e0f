use std::fs;
use std::io::Write;

use rpcwire_frame::MessageWriter;
use tracing::debug;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let payload = payload_from_args(&args)?;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(fs::File::create(path).map_err(|err| {
            io_error(&format!("create {} failed", path.display()), err)
        })?),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut writer = MessageWriter::new(sink);
    for _ in 0..args.repeat {
        writer
            .send(args.routing.as_bytes(), &payload)
            .map_err(|err| frame_error("encode failed", err))?;
    }
    debug!(
        messages = args.repeat,
        payload_size = payload.len(),
        "messages written"
    );
    Ok(SUCCESS)
}

fn payload_from_args(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return decode_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("read {} failed", path.display()), err));
    }
    Err(CliError::new(
        USAGE,
        "one of --data, --hex, or --file is required",
    ))
}

fn decode_hex(text: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex payload has an odd number of digits"));
    }
    digits
        .chunks(2)
        .map(|pair| -> CliResult<u8> { Ok((nibble(pair[0])? << 4) | nibble(pair[1])?) })
        .collect()
}

fn nibble(digit: u8) -> CliResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(CliError::new(
            USAGE,
            format!("invalid hex digit {:?}", char::from(digit)),
        )),
    }
}
