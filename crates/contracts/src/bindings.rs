use alloy_sol_types::sol;

// Factory events are emitted by the factory contracts with the instance
// address as the first field. The giveaway factory declares `numGrandsWins`.

sol! {
    /// Raffle factory (fixed-price and dynamic-supply raffles)
    #[derive(Debug, PartialEq, Eq)]
    interface IRaffleFactory {
        event RaffleCreated(
            address raffleAddress,
            uint256 grandPrizeMargin,
            uint256 minorPrizeMargin,
            uint256 endTimestamp,
            uint256 numGrandWins,
            uint256 numBonusWins,
            uint256 entryFee,
            address paytoken,
            bool _fixed
        );

        event OwnerCharged(address raffleAddress, uint256 amount, address owner);
        event PlayerJoined(address raffleAddress, address player);
        event PrizeRaffled(address raffleAddress, uint256[] grandPrizeTokens, uint256[] minorPrizeTokens);
        event RaffleCanceled(address raffleAddress);
        event PrizeWithdrawed(address raffleAddress, address player);
        event OwnerWithdrawed(address raffleAddress);
        event EmergencyWithdrawed(address raffleAddress, address player);
    }

    /// Giveaway factory
    #[derive(Debug, PartialEq, Eq)]
    interface IGiveawayFactory {
        event RaffleCreated(
            address raffleAddress,
            uint256 startTime,
            uint256 endTimestamp,
            address paytoken,
            uint256 grandPrizeMargin,
            uint256 minorPrizeMargin,
            uint256 numGrandsWins,
            uint256 numBonusWins
        );

        event OwnerCharged(address raffleAddress, uint256 amount, address owner);
        event PlayerJoined(address raffleAddress, address player);
        event PrizeRaffled(address raffleAddress, uint256[] grandPrizeTokens, uint256[] minorPrizeTokens);
        event RaffleCanceled(address raffleAddress);
        event PrizeWithdrawed(address raffleAddress, address player);
        event OwnerWithdrawed(address raffleAddress);
        event EmergencyWithdrawed(address raffleAddress, address player);
    }

    /// View methods of a deployed raffle or giveaway instance
    #[derive(Debug, PartialEq, Eq)]
    interface IDrawInstance {
        function name() external view returns (string memory);
        function owner() external view returns (address);
        function totalSupply() external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
    }
}
