use clap::{Arg, Command};

pub const ARG_REDIS_URL: &str = "redis-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_REDIS_URL)
            .long(ARG_REDIS_URL)
            .help("Redis connection URL for sessions and login state")
            .env("ENIREJO_REDIS_URL")
            .required(true),
    )
}
