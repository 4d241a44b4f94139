/// Split a command line into arguments.
///
/// Whitespace separates arguments unless it sits inside `'...'` or `"..."`.
/// A quote of the other kind inside a quoted run is literal, `\'` and `\"`
/// always produce the bare quote, and `''` yields an empty argument.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    // An argument has started, even if it is still empty.
    let mut started = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('\'' | '"')) => {
                current.extend(chars.next());
                started = true;
            }
            '\'' | '"' if quote.is_none() => {
                quote = Some(c);
                started = true;
            }
            c if quote == Some(c) => quote = None,
            c if c.is_whitespace() && quote.is_none() => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        args.push(current);
    }
    args
}
