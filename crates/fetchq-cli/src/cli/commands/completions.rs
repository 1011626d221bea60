//! `fetchq completions <shell>` – print a shell completion script.

use clap_complete::Shell;

pub fn run_completions(shell: Shell, mut cmd: clap::Command) {
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
