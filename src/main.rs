fn main() -> anyhow::Result<()> {
    circuitview::run()
}
