// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use junit_spool_cli::JunitSpoolApp;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let app = JunitSpoolApp::parse();
    let output = app.init_output();

    let stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    match app.exec(stdin, &mut stdout) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}
