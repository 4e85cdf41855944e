use std::io::{self, Write};

/// Writes `text` to stdout. A reader that closed the pipe early (`| head`)
/// is not an error.
pub fn write_stdout_text(text: &str) -> io::Result<()> {
    write_tolerating_closed_pipe(&mut io::stdout().lock(), &[text.as_bytes()])
}

pub fn write_stdout_line(text: &str) -> io::Result<()> {
    write_tolerating_closed_pipe(&mut io::stdout().lock(), &[text.as_bytes(), b"\n"])
}

fn write_tolerating_closed_pipe(writer: &mut dyn Write, chunks: &[&[u8]]) -> io::Result<()> {
    let written = chunks
        .iter()
        .try_for_each(|chunk| writer.write_all(chunk))
        .and_then(|()| writer.flush());
    match written {
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}
