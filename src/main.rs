fn main() -> anyhow::Result<()> {
    kangaroo_lambda::run_from_args(std::env::args())
}
