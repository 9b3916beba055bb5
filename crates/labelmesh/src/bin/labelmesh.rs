//! `labelmesh` command line front end.
//!
//! ```text
//! labelmesh run scan.nii volumes/ meshes/ --report run.json
//! labelmesh segment volumes/scan.mha meshes/ --component-size 100
//! labelmesh optimize -o meshes/ meshes/Component1_1.vtk --mesh-format ply
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use labelmesh::stages::{convert, diffusion, isosurface, optimize, segment};
use labelmesh::{
    ArtifactMeasure, DirectPaths, MeshFormat, PathResolver, Pipeline, PipelineParams,
    PipelinePaths, RecursiveSearch, Result,
};

#[derive(Parser)]
#[command(
    name = "labelmesh",
    version,
    about = "Turn labeled volumes into smoothed, simplified surface meshes"
)]
struct Cli {
    /// JSON file with pipeline parameters; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Search for bare file and directory names below this directory
    #[arg(long, global = true)]
    search_root: Option<PathBuf>,

    /// Write the log to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all five stages on one labeled volume
    Run {
        /// Labeled volume (.nii, .mha, .mhd)
        input: String,
        /// Directory for the converted volume
        volume_dir: String,
        /// Directory for masks, filtered volumes and meshes
        output_dir: String,
        /// Write a JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Convert a labeled volume to MetaImage
    Convert {
        /// Labeled volume (.nii, .mha, .mhd)
        input: String,
        /// Output directory
        output_dir: String,
    },
    /// Split a labeled volume into component masks
    Segment {
        /// Labeled volume (.nii, .mha, .mhd)
        input: String,
        /// Output directory
        output_dir: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Smooth component masks with anisotropic diffusion
    Filter(StageArgs),
    /// Extract raw meshes from filtered volumes
    Isosurface(StageArgs),
    /// Clean, decimate, smooth and repair raw meshes
    Optimize(StageArgs),
}

/// Inputs and output of a per-component stage.
#[derive(Args)]
struct StageArgs {
    /// Output directory
    #[arg(short, long)]
    output_dir: String,
    /// Input files
    #[arg(required = true)]
    inputs: Vec<String>,
    #[command(flatten)]
    params: ParamArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum MeasureArg {
    Triangles,
    Area,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Vtk,
    Ply,
}

/// Parameter overrides. Unset flags keep the config or default value.
#[derive(Args, Default)]
struct ParamArgs {
    /// Components with fewer voxels are discarded [default: 50]
    #[arg(long)]
    component_size: Option<usize>,
    /// Diffusion time step [default: 0.0025]
    #[arg(long)]
    time_step: Option<f64>,
    /// Diffusion conductance [default: 2.0]
    #[arg(long)]
    conductance: Option<f64>,
    /// Diffusion iterations [default: 16]
    #[arg(long)]
    iterations: Option<usize>,
    /// Iso-value of the surface [default: 0.5]
    #[arg(long, allow_negative_numbers = true)]
    contour: Option<f32>,
    /// Vertices closer than this are welded [default: 0.00025]
    #[arg(long)]
    cleaning_tolerance: Option<f64>,
    /// Regions smaller than this are removed [default: 150]
    #[arg(long)]
    artifact_tolerance: Option<f64>,
    /// How region size is measured [default: triangles]
    #[arg(long, value_enum)]
    artifact_measure: Option<MeasureArg>,
    /// Fraction of triangles removed by decimation [default: 0.01]
    #[arg(long)]
    target_reduction: Option<f64>,
    /// Laplacian smoothing factor [default: 0.1]
    #[arg(long)]
    relaxation: Option<f64>,
    /// Laplacian smoothing passes [default: 40]
    #[arg(long)]
    tin_iterations: Option<usize>,
    /// Holes up to this radius are filled [default: 10]
    #[arg(long)]
    hole_tolerance: Option<f64>,
    /// Format of optimized meshes [default: vtk]
    #[arg(long, value_enum)]
    mesh_format: Option<FormatArg>,
}

impl ParamArgs {
    fn apply(&self, params: &mut PipelineParams) {
        set(&mut params.component_size, self.component_size);
        set(&mut params.time_step, self.time_step);
        set(&mut params.conductance, self.conductance);
        set(&mut params.iterations, self.iterations);
        set(&mut params.contour, self.contour);
        set(&mut params.cleaning_tolerance, self.cleaning_tolerance);
        set(&mut params.artifact_tolerance, self.artifact_tolerance);
        set(&mut params.target_reduction, self.target_reduction);
        set(&mut params.relaxation, self.relaxation);
        set(&mut params.tin_iterations, self.tin_iterations);
        set(&mut params.hole_tolerance, self.hole_tolerance);
        set(
            &mut params.artifact_measure,
            self.artifact_measure.map(|m| match m {
                MeasureArg::Triangles => ArtifactMeasure::TriangleCount,
                MeasureArg::Area => ArtifactMeasure::SurfaceArea,
            }),
        );
        set(
            &mut params.mesh_format,
            self.mesh_format.map(|f| match f {
                FormatArg::Vtk => MeshFormat::Vtk,
                FormatArg::Ply => MeshFormat::Ply,
            }),
        );
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = labelmesh::init_logging(cli.log_file.as_deref()) {
        eprintln!("error: {e}");
        process::exit(1);
    }
    if let Err(e) = run(&cli) {
        log::error!("{e}");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let resolver: Box<dyn PathResolver> = match &cli.search_root {
        Some(root) => Box::new(RecursiveSearch::new(root)),
        None => Box::new(DirectPaths),
    };
    let resolver = resolver.as_ref();
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::Run {
            input,
            volume_dir,
            output_dir,
            report,
            params,
        } => {
            let pipeline = Pipeline::new(load_params(config, params)?)?;
            let paths = PipelinePaths::resolve(resolver, input, volume_dir, output_dir)?;
            let summary = pipeline.run(&paths)?;
            for component in &summary.components {
                println!("{}", component.mesh.display());
            }
            if let Some(path) = report {
                summary.write_json(path)?;
                log::info!("run report written to {}", path.display());
            }
        }
        Commands::Convert { input, output_dir } => {
            let input = resolver.resolve_file(input, labelmesh::io::VOLUME_EXTENSIONS)?;
            let output_dir = resolver.resolve_dir(output_dir)?;
            let (_, output) = convert::convert(&input, &output_dir)?;
            println!("{}", output.display());
        }
        Commands::Segment {
            input,
            output_dir,
            params,
        } => {
            let params = load_params(config, params)?;
            let input = resolver.resolve_file(input, labelmesh::io::VOLUME_EXTENSIONS)?;
            let output_dir = resolver.resolve_dir(output_dir)?;
            for path in segment::segment_file(&input, &output_dir, params.component_size)? {
                println!("{}", path.display());
            }
        }
        Commands::Filter(args) => {
            let params = load_params(config, &args.params)?.diffusion();
            for_each_input(resolver, args, labelmesh::io::VOLUME_EXTENSIONS, |input, dir| {
                diffusion::filter_file(input, dir, &params).map(|(_, path)| path)
            })?;
        }
        Commands::Isosurface(args) => {
            let contour = load_params(config, &args.params)?.contour;
            for_each_input(resolver, args, labelmesh::io::VOLUME_EXTENSIONS, |input, dir| {
                isosurface::isosurface_file(input, dir, contour).map(|(_, path)| path)
            })?;
        }
        Commands::Optimize(args) => {
            let params = load_params(config, &args.params)?;
            let (optimize_params, format) = (params.optimize(), params.mesh_format);
            for_each_input(resolver, args, labelmesh::io::MESH_EXTENSIONS, |input, dir| {
                optimize::optimize_file(input, dir, &optimize_params, format).map(|(_, path)| path)
            })?;
        }
    }
    Ok(())
}

/// Config file (or defaults) with the command line overrides applied.
fn load_params(config: Option<&Path>, overrides: &ParamArgs) -> Result<PipelineParams> {
    let mut params = match config {
        Some(path) => PipelineParams::from_json_file(path)?,
        None => PipelineParams::default(),
    };
    overrides.apply(&mut params);
    params.validate()?;
    Ok(params)
}

/// Resolves every input first, then runs `stage` on each and prints its output.
fn for_each_input(
    resolver: &dyn PathResolver,
    args: &StageArgs,
    extensions: &[&str],
    stage: impl Fn(&Path, &Path) -> Result<PathBuf>,
) -> Result<()> {
    let output_dir = resolver.resolve_dir(&args.output_dir)?;
    let inputs = args
        .inputs
        .iter()
        .map(|name| resolver.resolve_file(name, extensions))
        .collect::<Result<Vec<_>>>()?;
    for input in &inputs {
        println!("{}", stage(input, &output_dir)?.display());
    }
    Ok(())
}
