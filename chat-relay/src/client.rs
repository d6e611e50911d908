use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{cli::ClientArgs, connection::write_line};

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    match &args.name {
        Some(name) => write_line(&mut writer, name).await?,
        None => write_stdout("Enter your name:").await?,
    }

    let mut stdin = BufReader::new(tokio::io::stdin());
    run_client_loop(&mut reader, &mut writer, &mut stdin).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

/// Copies relay lines to stdout and stdin lines to the relay until either
/// side closes or ctrl-c is pressed.
///
/// Both sides are read through [`tokio::io::Lines`], whose `next_line` keeps a
/// partly read line across `select!` iterations.
pub async fn run_client_loop<R, W, I>(
    reader: &mut R,
    writer: &mut W,
    input: &mut I,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
{
    let mut server_lines = reader.lines();
    let mut input_lines = input.lines();
    loop {
        select! {
            server_line = server_lines.next_line() => {
                match server_line? {
                    Some(line) => write_stdout(&line).await?,
                    None => break,
                }
            }
            input_line = input_lines.next_line() => {
                match input_line? {
                    Some(line) => write_line(writer, &line).await?,
                    None => break,
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
