use clap::Parser;

/// Map an RBD image to a block device
#[derive(Parser, Debug)]
pub struct Map {
    /// Connect to one or more monitor addresses (192.168.0.1[:6789]), comma separated
    #[clap(short, long = "monitor", required = true, value_delimiter = ',')]
    pub monitors: Vec<String>,
    /// Pool the image lives in
    #[clap(short, long, required = true)]
    pub pool: String,
    /// Image to map
    #[clap(short, long, required = true)]
    pub image: String,
    /// Use a pre-defined image namespace within the pool
    #[clap(long)]
    pub namespace: Option<String>,
    /// Snapshot name to map
    #[clap(long)]
    pub snap: Option<String>,
    /// Username, without the 'client.' prefix
    #[clap(long)]
    pub id: Option<String>,
    /// User authentication secret
    #[clap(long)]
    pub secret: Option<String>,
    /// Map the image read-only
    #[clap(long)]
    pub read_only: bool,
}
