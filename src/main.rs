use std::cell::RefCell;
use std::fs;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;

use clap::Parser;

use autofill::{render_cells, AutofillOptions, Autofiller, GridTemplate, WordIndex, BLANK, BLOCK};

/// Fill a crossword grid from a word list
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Grid template file: one row per line, `#` for blocks, `.` for blanks, letters for fixed
    /// cells
    template: String,

    /// Word list file (WORD;score per line)
    #[arg(short, long, conflicts_with = "index", required_unless_present = "index")]
    word_list: Option<String>,

    /// Prebuilt index file, as written by --write-index
    #[arg(short, long)]
    index: Option<String>,

    /// Save the loaded index as JSON
    #[arg(long)]
    write_index: Option<String>,

    /// Cells with a bar on their right edge (comma separated)
    #[arg(long, value_delimiter = ',')]
    vbar: Vec<usize>,

    /// Cells with a bar on their bottom edge (comma separated)
    #[arg(long, value_delimiter = ',')]
    hbar: Vec<usize>,

    /// Give up on any branch whose estimated cost exceeds this
    #[arg(short = 'c', long)]
    max_cost: Option<f64>,
}

fn main() -> ExitCode {
    let debug_enabled = std::env::var("AUTOFILL_DEBUG").is_ok();
    autofill::logging::init_logger(debug_enabled);

    if let Err(e) = try_main() {
        eprintln!("Error: {e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Parse the `#`/`.` template format into a `GridTemplate`.
fn parse_template(text: &str) -> Result<GridTemplate, Box<dyn std::error::Error>> {
    let rows: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let width = rows.first().map_or(0, |row| row.chars().count());
    if width == 0 {
        return Err("template is empty".into());
    }

    let mut cells = vec![];
    for (row_idx, row) in rows.iter().enumerate() {
        if row.chars().count() != width {
            return Err(format!("template row {} has {} cells, expected {width}", row_idx + 1, row.chars().count()).into());
        }
        for c in row.chars() {
            cells.push(match c {
                '#' => BLOCK.to_string(),
                '.' => BLANK.to_string(),
                c if c.is_alphabetic() => c.to_uppercase().collect(),
                c => return Err(format!("unexpected character {c:?} in template").into()),
            });
        }
    }

    Ok(GridTemplate {
        cells,
        width,
        height: rows.len(),
        vbars: vec![],
        hbars: vec![],
    })
}

fn load_index(cli: &Cli) -> Result<WordIndex, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.index {
        let json = fs::read_to_string(path)?;
        return WordIndex::from_json(&json).map_err(|e| format!("{} ({}): {e}", path, e.code()).into());
    }

    let path = cli.word_list.as_deref().ok_or("no word list given")?;
    Ok(WordIndex::build(&fs::read_to_string(path)?))
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let index = load_index(&cli)?;
    log::info!("Loaded {} words", index.word_count());

    if let Some(path) = &cli.write_index {
        fs::write(path, index.to_json()?)?;
        log::info!("Wrote index to {path}");
    }

    let template = parse_template(&fs::read_to_string(&cli.template)?)?.with_bars(&cli.vbar, &cli.hbar);
    let width = template.width;
    let options = AutofillOptions { cost_ceiling: cli.max_cost };

    let fill: Rc<RefCell<Option<Vec<String>>>> = Rc::new(RefCell::new(None));
    let on_result = {
        let fill = fill.clone();
        move |_: &GridTemplate, cells: Vec<String>| *fill.borrow_mut() = Some(cells)
    };

    let mut autofiller = Autofiller::new(Arc::new(index), template, options, on_result, || {})
        .map_err(|e| format!("{} ({})", e, e.code()))?;
    autofiller.run_to_completion();

    eprintln!("{:?}", autofiller.statistics());

    let result = fill.borrow_mut().take();
    match result {
        Some(cells) => {
            println!("{}", render_cells(&cells, width));
            Ok(())
        }
        None => Err("no fill exists for this grid".into()),
    }
}
