use crate::output::print_json;
use dacycle_core::cycle::{format_date, parse_range, Cycle};

/// Print the cycles a run over the same range would process.
pub fn run(start: &str, end: &str, interval: u32, json: bool) -> anyhow::Result<()> {
    let dates = parse_range(start, end, interval)?;

    let mut prev: Option<String> = None;
    let cycles: Vec<Cycle> = dates
        .into_iter()
        .map(|date| {
            let cycle = Cycle::new(date, prev.take());
            prev = Some(format_date(&date));
            cycle
        })
        .collect();

    if json {
        print_json(&cycles)?;
    } else {
        for c in &cycles {
            println!("{}", c.date_str);
        }
    }
    Ok(())
}
