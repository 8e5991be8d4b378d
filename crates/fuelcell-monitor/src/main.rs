mod infra;
mod runtime;

fn main() -> anyhow::Result<()> {
    runtime::run_from_args()
}
