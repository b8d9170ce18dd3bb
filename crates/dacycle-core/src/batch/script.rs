use crate::config::BatchConfig;
use std::path::PathBuf;

/// One batch job: everything needed to render its PBS script.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSubmission {
    pub job_name: String,
    pub log_path: PathBuf,
    pub proj_number: String,
    pub queue: String,
    pub walltime: String,
    pub nodes: u32,
    pub ncpus: u32,
    pub mpiprocs: u32,
    pub mem_gb: u32,
    pub work_dir: PathBuf,
    /// Program run from `work_dir`, e.g. `filter`.
    pub executable: String,
}

impl JobSubmission {
    pub fn new(
        job_name: impl Into<String>,
        executable: impl Into<String>,
        log_path: PathBuf,
        work_dir: PathBuf,
        batch: &BatchConfig,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            log_path,
            proj_number: batch.proj_number.clone(),
            queue: batch.queue.clone(),
            walltime: batch.walltime.clone(),
            nodes: batch.nodes,
            ncpus: batch.ncpus,
            mpiprocs: batch.mpiprocs,
            mem_gb: batch.mem_gb,
            work_dir,
            executable: executable.into(),
        }
    }
}

/// PBS script for `job`. No side effects; the caller decides where it goes.
pub fn render_job_script(job: &JobSubmission) -> String {
    format!(
        "#!/bin/bash
#PBS -N {job_name}
#PBS -j oe
#PBS -o {log_path}
#PBS -A {proj_number}
#PBS -q {queue}
#PBS -l walltime={walltime}
#PBS -l select={nodes}:ncpus={ncpus}:mpiprocs={mpiprocs}:mem={mem}GB
module load ncarenv

cd {work_dir}
./{executable}
",
        job_name = job.job_name,
        log_path = job.log_path.display(),
        proj_number = job.proj_number,
        queue = job.queue,
        walltime = job.walltime,
        nodes = job.nodes,
        ncpus = job.ncpus,
        mpiprocs = job.mpiprocs,
        mem = job.mem_gb,
        work_dir = job.work_dir.display(),
        executable = job.executable,
    )
}
