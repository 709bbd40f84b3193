//! The `bucketsync-upload` binary.
#![warn(missing_docs)]

fn main() -> anyhow::Result<()> {
    bucketsync_uploader::cli::execute()
}
