use std::process::ExitCode;

use getdp_io::{
    ErrorKind, GetDpReader, IoError, ReaderOptions, ReconstructedMesh, Summary, VtkWriter,
};
use log::{info, warn};

fn usage() {
    eprintln!("usage: getdp-cli info <mesh.msh> [--pre FILE] [--res FILE] [--json]");
    eprintln!(
        "       getdp-cli convert <mesh.msh> <output> [--pre FILE] [--res FILE] [--format vtk|vtu|ply] [--config options.json]"
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Info,
    Convert { output: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    command: Command,
    mesh: String,
    pre: Option<String>,
    res: Option<String>,
    format: String,
    config: Option<String>,
    json: bool,
}

fn parse_args(args: &[String]) -> Option<Invocation> {
    let (command, rest) = args.split_first()?;
    let mut positional = Vec::new();
    let mut invocation = Invocation {
        command: Command::Info,
        mesh: String::new(),
        pre: None,
        res: None,
        format: "vtk".to_string(),
        config: None,
        json: false,
    };

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--pre" => invocation.pre = Some(iter.next()?.clone()),
            "--res" => invocation.res = Some(iter.next()?.clone()),
            "--format" => invocation.format = iter.next()?.clone(),
            "--config" => invocation.config = Some(iter.next()?.clone()),
            "--json" => invocation.json = true,
            flag if flag.starts_with("--") => return None,
            value => positional.push(value.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    invocation.mesh = positional.next()?;
    invocation.command = match command.as_str() {
        "info" => Command::Info,
        "convert" => Command::Convert {
            output: positional.next()?,
        },
        _ => return None,
    };
    if positional.next().is_some() {
        return None;
    }
    Some(invocation)
}

fn exit_code(err: &IoError) -> ExitCode {
    match err.kind() {
        ErrorKind::NotFound => ExitCode::from(3),
        ErrorKind::Malformed => ExitCode::from(4),
        ErrorKind::Precondition => ExitCode::from(5),
        ErrorKind::Io => ExitCode::from(1),
    }
}

fn print_summary(summary: &Summary) {
    if let Some(mesh) = &summary.mesh {
        println!("num_nodes: {}", mesh.num_nodes);
        println!("num_elements: {}", mesh.num_elements);
        if !mesh.physical_regions.is_empty() {
            let regions: Vec<String> = mesh.physical_regions.iter().map(i32::to_string).collect();
            println!("physical_regions: {}", regions.join(", "));
        }
    }
    if let Some(dof) = &summary.dof {
        println!("num_dof_blocks: {}", dof.num_dof_blocks);
        println!("total_dofs: {}", dof.total_dofs);
        println!("resolution_name: {}", dof.resolution_name);
        println!("main_resolution_number: {}", dof.main_resolution_number);
    }
    if let Some(solution) = &summary.solution {
        println!("num_solutions: {}", solution.num_solutions);
        println!("num_steps: {}", solution.num_steps);
        println!("has_mesh: {}", solution.has_mesh);
    }
}

fn report_diagnostics(mesh: &ReconstructedMesh) {
    let diagnostics = &mesh.diagnostics;
    if diagnostics.dropped_elements > 0 {
        warn!("{} elements of unsupported type were not exported", diagnostics.dropped_elements);
    }
    if diagnostics.arity_mismatches > 0 {
        warn!("{} elements with a wrong node count were not exported", diagnostics.arity_mismatches);
    }
    if diagnostics.out_of_range_dofs > 0 {
        warn!("{} DOF records referenced no point", diagnostics.out_of_range_dofs);
    }
    if let Some((samples, points)) = diagnostics.solution_length_mismatch {
        warn!("solution has {samples} values for {points} points; not exported");
    }
}

fn load(invocation: &Invocation) -> Result<GetDpReader, IoError> {
    let options = match &invocation.config {
        Some(path) => ReaderOptions::from_json_file(path)?,
        None => ReaderOptions::default(),
    };
    let mut reader = GetDpReader::new(options);
    reader.read_msh(&invocation.mesh)?;
    if let Some(pre) = &invocation.pre {
        reader.read_pre(pre)?;
    }
    if let Some(res) = &invocation.res {
        reader.read_res(res)?;
    }
    Ok(reader)
}

fn run(invocation: &Invocation) -> Result<(), IoError> {
    let mut reader = load(invocation)?;
    match &invocation.command {
        Command::Info => {
            let summary = reader.summary();
            if invocation.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Command::Convert { output } => {
            report_diagnostics(reader.mesh()?);
            let written = reader.export(&invocation.format, output, &VtkWriter::new())?;
            info!("exported {}", written.display());
            println!("wrote {}", written.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(invocation) = parse_args(&args) else {
        usage();
        return ExitCode::from(2);
    };

    match run(&invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            exit_code(&err)
        }
    }
}
