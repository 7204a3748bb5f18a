//! A minimal program built on `argtree`: a `greet` command with a `--loud`
//! flag and a `name` positional, plus a `find`-style expression demo.

use std::sync::Arc;

use argtree::arg::Arg;
use argtree::argcounter::Remaining;
use argtree::command::Command;
use argtree::expr::{Expr, Expression};
use argtree::flag::Flag;
use argtree::fs::OsFs;
use argtree::lifecycle::ActionOf;
use argtree::options::Options;
use argtree::value::{BoolValue, IntValue, StringValue};
use argtree::App;

#[tokio::main]
async fn main() {
    let greet = Command::new("greet")
        .help("print a greeting")
        .flag(Flag::new("loud").short('l').help("shout the greeting").value(BoolValue::default()))
        .arg(Arg::new("name").value(StringValue::default()).help("who to greet"))
        .action(ActionOf::from_sync(|ctx| {
            let name = ctx.value::<StringValue>("name").unwrap_or_default().0;
            let loud = ctx.value::<BoolValue>("loud").unwrap_or_default().0;
            let mut greeting = format!("Hello, {name}!");
            if loud {
                greeting = greeting.to_uppercase();
            }
            println!("{greeting}");
            Ok(())
        }));

    let find = Command::new("find").help("a find(1)-flavored expression demo").arg(
        Arg::new("query")
            .value(Expression::new())
            .expr(Expr::new("name").arg(Arg::new("pattern").value(StringValue::default())))
            .expr(Expr::new("offset").arg(Arg::new("n").value(IntValue::default())))
            .expr(Expr::new("multi").arg(Arg::new("values").counter(Remaining::new(1)))),
    );

    let root = Command::new("minimal")
        .help("a small argtree demo application")
        .subcommand(greet)
        .subcommand(find)
        .options(Options::SORTED_COMMANDS);

    let app = App::new(root).version("0.1.0");
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let code = app.run_with_fs(argv, Arc::new(OsFs)).await;
    std::process::exit(code);
}
