use vidctrl_frame::{DEFAULT_MAX_BUFFERED, LENGTH_PREFIX_SIZE};
use vidctrl_transport::{DEFAULT_CONTROL_PORT, DEFAULT_MEDIA_PORT};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("vidctrl {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: vidctrl");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("VIDCTRL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("VIDCTRL_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("control_port: {DEFAULT_CONTROL_PORT}");
    println!("media_port: {DEFAULT_MEDIA_PORT}");
    println!(
        "framing: u16 length prefix ({LENGTH_PREFIX_SIZE} bytes), max buffered {DEFAULT_MAX_BUFFERED}"
    );
    println!(
        "features: peer={}, async={}, cli=true",
        cfg!(feature = "peer"),
        cfg!(feature = "async")
    );

    Ok(SUCCESS)
}
