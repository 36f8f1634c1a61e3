//! Interactive notebook loop on stdin/stdout.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::session::{Control, Session};

pub async fn run(session: &mut Session) -> Result<()> {
    println!(
        "mathsheet - sheet '{}'. Type 'help' for commands, ':help' for sheet commands.",
        session.sheet.name
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("In [{}]: ", session.next_cell_number()?);
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(':') {
            match session.meta(line).await {
                Ok((_, Control::Quit)) => break,
                Ok((text, Control::Continue)) => println!("{}", text),
                Err(e) => println!("Error: {}", e),
            }
            continue;
        }

        match session.run_cell(line).await {
            Ok(cell) => println!("Out [{}]: {}\n", cell.cell_number, session.render(&cell)),
            Err(e) => println!("Error: {}\n", e),
        }
    }
    Ok(())
}
