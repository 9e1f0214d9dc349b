// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

/// Install custom panic handler for better error reporting
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s,
                None => "Unknown panic",
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!(" at {}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();

        log::error!("elkan-tools panicked{}: {}", location, msg);
        eprintln!("\n\x1b[31mPANIC{}: {}\x1b[0m", location, msg);

        if std::env::var("RUST_BACKTRACE").is_ok_and(|var| var != "0") {
            eprintln!(
                "\nBacktrace:\n{:?}",
                std::backtrace::Backtrace::force_capture()
            );
        }
    }));
}
